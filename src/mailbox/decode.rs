//! Message decoding — raw RFC822 bytes to a normalized `ParsedMessage`.
//!
//! Total by design: header and payload decode problems degrade to empty
//! fields, never to errors. mail-parser handles encoded-word segments with
//! their declared charsets (UTF-8 fallback) and replaces invalid byte
//! sequences in payloads.

use mail_parser::{Addr, Address, Message, MessagePart, MessageParser, MimeHeaders, PartType};
use tracing::debug;

use crate::mailbox::RawMessage;
use crate::pipeline::types::ParsedMessage;

/// Decode a raw message into normalized headers and a plain-text body.
///
/// A blob that does not parse at all yields a `ParsedMessage` with every
/// field empty.
pub fn decode(raw: &RawMessage) -> ParsedMessage {
    let Some(message) = MessageParser::default().parse(raw.bytes.as_slice()) else {
        debug!(id = raw.id, "Message did not parse; emitting empty fields");
        return ParsedMessage::default();
    };

    ParsedMessage {
        from: format_address(message.from()),
        to: format_address(message.to()),
        cc: format_address(message.cc()),
        subject: message.subject().unwrap_or_default().to_string(),
        date: message
            .date()
            .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0)),
        body: extract_body(&message),
    }
}

// ── Headers ─────────────────────────────────────────────────────────

/// Render an address header as comma-joined `Name <addr>` entries.
fn format_address(addr: Option<&Address>) -> String {
    let Some(addr) = addr else {
        return String::new();
    };
    match addr {
        Address::List(list) => join_addrs(list.iter()),
        Address::Group(groups) => join_addrs(groups.iter().flat_map(|g| g.addresses.iter())),
    }
}

fn join_addrs<'a>(addrs: impl Iterator<Item = &'a Addr<'a>>) -> String {
    addrs
        .filter_map(|a| match (a.name.as_deref(), a.address.as_deref()) {
            (Some(name), Some(email)) => Some(format!("{name} <{email}>")),
            (None, Some(email)) => Some(email.to_string()),
            (Some(name), None) => Some(name.to_string()),
            (None, None) => None,
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Body extraction ─────────────────────────────────────────────────

/// Body of a message per the extraction contract: a single-part message
/// yields its decoded payload as-is; a multipart message yields the first
/// plain-text, non-attachment part in pre-order; no match yields "".
fn extract_body(message: &Message) -> String {
    let Some(root) = message.parts.first() else {
        return String::new();
    };
    match &root.body {
        PartType::Multipart(_) | PartType::Message(_) => {
            find_plain_text(message, 0).unwrap_or_default()
        }
        PartType::Text(text) | PartType::Html(text) => text.clone().into_owned(),
        PartType::Binary(bytes) | PartType::InlineBinary(bytes) => {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Pre-order walk for the first text/plain part not disposed as an
/// attachment. Descends into nested message/rfc822 parts.
fn find_plain_text(message: &Message, index: usize) -> Option<String> {
    let part = message.parts.get(index)?;
    match &part.body {
        PartType::Multipart(children) => children
            .iter()
            .find_map(|&child| find_plain_text(message, child)),
        PartType::Message(nested) => find_plain_text(nested, 0),
        PartType::Text(text) if !is_attachment(part) => Some(text.clone().into_owned()),
        _ => None,
    }
}

fn is_attachment(part: &MessagePart) -> bool {
    part.content_disposition()
        .is_some_and(|cd| cd.ctype().eq_ignore_ascii_case("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bytes: &str) -> RawMessage {
        RawMessage {
            id: 1,
            bytes: bytes.as_bytes().to_vec(),
        }
    }

    // ── Header decoding ─────────────────────────────────────────────

    #[test]
    fn plain_headers_pass_through_unchanged() {
        let msg = decode(&raw(
            "From: alice@example.com\r\nSubject: Weekly status\r\n\r\nhello",
        ));
        assert_eq!(msg.from, "alice@example.com");
        assert_eq!(msg.subject, "Weekly status");
    }

    #[test]
    fn encoded_word_subject_decodes() {
        // =?UTF-8?B?5L2g5aW9?= is "你好"
        let msg = decode(&raw("Subject: =?UTF-8?B?5L2g5aW9?=\r\n\r\nbody"));
        assert_eq!(msg.subject, "你好");
    }

    #[test]
    fn named_address_renders_with_brackets() {
        let msg = decode(&raw(
            "From: Alice Liddell <alice@example.com>\r\nTo: bob@example.com, Carol <carol@example.com>\r\n\r\n",
        ));
        assert_eq!(msg.from, "Alice Liddell <alice@example.com>");
        assert_eq!(msg.to, "bob@example.com, Carol <carol@example.com>");
    }

    #[test]
    fn missing_headers_are_empty() {
        let msg = decode(&raw("Subject: only\r\n\r\n"));
        assert_eq!(msg.from, "");
        assert_eq!(msg.to, "");
        assert_eq!(msg.cc, "");
        assert!(msg.date.is_none());
    }

    #[test]
    fn date_header_parses_to_utc() {
        let msg = decode(&raw(
            "Date: Wed, 06 Nov 2024 13:00:00 +0000\r\n\r\n",
        ));
        let date = msg.date.expect("date should parse");
        assert_eq!(date.to_rfc3339(), "2024-11-06T13:00:00+00:00");
    }

    // ── Body extraction ─────────────────────────────────────────────

    #[test]
    fn single_part_body_returned_as_is() {
        let msg = decode(&raw("Subject: s\r\n\r\nline one\nline two"));
        assert_eq!(msg.body, "line one\nline two");
    }

    #[test]
    fn single_part_empty_payload_is_empty_string() {
        let msg = decode(&raw("Subject: s\r\n\r\n"));
        assert_eq!(msg.body, "");
    }

    #[test]
    fn multipart_picks_first_plain_text_part() {
        let msg = decode(&raw(concat!(
            "Subject: s\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>rendered</p>\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain body\r\n",
            "--XYZ--\r\n",
        )));
        assert_eq!(msg.body.trim_end(), "plain body");
    }

    #[test]
    fn attachment_parts_are_skipped() {
        let msg = decode(&raw(concat!(
            "Subject: s\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
            "\r\n",
            "attached notes\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "inline body\r\n",
            "--XYZ--\r\n",
        )));
        assert_eq!(msg.body.trim_end(), "inline body");
    }

    #[test]
    fn attachment_only_multipart_yields_empty_body() {
        let msg = decode(&raw(concat!(
            "Subject: s\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"a.txt\"\r\n",
            "\r\n",
            "attachment one\r\n",
            "--XYZ--\r\n",
        )));
        assert_eq!(msg.body, "");
    }

    #[test]
    fn html_only_multipart_yields_empty_body() {
        let msg = decode(&raw(concat!(
            "Subject: s\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>only html</p>\r\n",
            "--XYZ--\r\n",
        )));
        assert_eq!(msg.body, "");
    }

    #[test]
    fn garbage_bytes_never_panic() {
        let msg = decode(&RawMessage {
            id: 9,
            bytes: vec![0xff, 0xfe, 0x00],
        });
        assert_eq!(msg.subject, "");
        assert_eq!(msg.from, "");
    }
}
