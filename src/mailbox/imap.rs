//! IMAP mailbox client — one authenticated session over TLS.
//!
//! Speaks enough IMAP4rev1 to drive the pipeline: LOGIN, SELECT, SEARCH,
//! FETCH (RFC822) and IDLE/DONE, with literal-aware response reading so
//! message bodies survive intact.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mailbox::{
    IdleEvent, Mailbox, MailboxConnector, MailboxSelector, MessageId, RawMessage, count_window,
};

/// One response line, plus the literal that followed it (FETCH bodies).
struct ResponseItem {
    line: String,
    literal: Option<Vec<u8>>,
}

/// A logged-in IMAP session. Not thread-safe; `ImapMailbox` serializes it.
struct ImapSession {
    stream: BufReader<TlsStream<TcpStream>>,
    tag: u32,
}

impl ImapSession {
    async fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .await
            .map_err(|e| MailError::Connect {
                host: config.imap_host.clone(),
                reason: e.to_string(),
            })?;

        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
            .map_err(|e| MailError::Tls(e.to_string()))?;
        let stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| MailError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(stream),
            tag: 0,
        };

        let greeting = session.read_line().await?;
        if !greeting.starts_with("* OK") {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {greeting}"
            )));
        }
        Ok(session)
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("A{}", self.tag)
    }

    async fn send(&mut self, data: &str) -> Result<(), MailError> {
        let stream = self.stream.get_mut();
        stream.write_all(data.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read one CRLF-terminated line, lossily decoded, without the CRLF.
    async fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(MailError::Protocol("connection closed by server".into()));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Read a response line; if it announces a literal (`{n}` suffix), read
    /// the following `n` bytes too.
    async fn read_item(&mut self) -> Result<ResponseItem, MailError> {
        let line = self.read_line().await?;
        let literal = match parse_literal_len(&line) {
            Some(len) => {
                let mut buf = vec![0u8; len];
                self.stream.read_exact(&mut buf).await?;
                Some(buf)
            }
            None => None,
        };
        Ok(ResponseItem { line, literal })
    }

    /// Send a tagged command and collect responses through the tagged
    /// completion. NO/BAD completions become protocol errors (the error
    /// carries only the command verb, never its arguments).
    async fn command(&mut self, cmd: &str) -> Result<Vec<ResponseItem>, MailError> {
        let tag = self.next_tag();
        self.send(&format!("{tag} {cmd}\r\n")).await?;

        let tagged = format!("{tag} ");
        let mut items = Vec::new();
        loop {
            let item = self.read_item().await?;
            let done = item.line.starts_with(&tagged);
            items.push(item);
            if done {
                break;
            }
        }

        let last = &items[items.len() - 1];
        let status = last.line[tagged.len()..].trim_start();
        if status.starts_with("OK") {
            Ok(items)
        } else {
            let verb = cmd.split_whitespace().next().unwrap_or("?");
            Err(MailError::Protocol(format!(
                "{verb} failed: {}",
                last.line
            )))
        }
    }

    async fn login(&mut self, account: &str, password: &str) -> Result<(), MailError> {
        let cmd = format!("LOGIN {} {}", quote(account), quote(password));
        match self.command(&cmd).await {
            Ok(_) => Ok(()),
            Err(MailError::Protocol(reason)) => Err(MailError::Auth {
                account: account.to_string(),
                reason,
            }),
            Err(e) => Err(e),
        }
    }

    /// SELECT INBOX, returning the announced EXISTS count.
    async fn select_inbox(&mut self) -> Result<u32, MailError> {
        let items = self.command("SELECT \"INBOX\"").await?;
        items
            .iter()
            .find_map(|item| parse_exists(&item.line))
            .ok_or_else(|| MailError::Protocol("SELECT response missing EXISTS".into()))
    }

    async fn search(&mut self, query: &str) -> Result<Vec<u32>, MailError> {
        let items = self.command(&format!("SEARCH {query}")).await.map_err(|e| {
            match e {
                MailError::Protocol(reason) => MailError::Search(reason),
                other => other,
            }
        })?;

        let mut ids: Vec<u32> = Vec::new();
        for item in &items {
            if let Some(rest) = item.line.strip_prefix("* SEARCH") {
                ids.extend(rest.split_whitespace().filter_map(|t| t.parse::<u32>().ok()));
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>, MailError> {
        let items = self
            .command(&format!("FETCH {id} (RFC822)"))
            .await
            .map_err(|e| match e {
                MailError::Protocol(reason) => MailError::Fetch { id, reason },
                other => other,
            })?;

        items
            .into_iter()
            .find_map(|item| item.literal)
            .ok_or_else(|| MailError::Fetch {
                id,
                reason: "server returned no message literal".into(),
            })
    }

    /// IDLE until the server announces new mail or `timeout` elapses, then
    /// terminate the idle cleanly with DONE.
    async fn idle(&mut self, timeout: Duration) -> Result<IdleEvent, MailError> {
        let tag = self.next_tag();
        self.send(&format!("{tag} IDLE\r\n")).await?;

        let ack = self.read_line().await?;
        if !ack.starts_with('+') {
            return Err(MailError::Protocol(format!("IDLE not accepted: {ack}")));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let event = loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break IdleEvent::Timeout;
            }
            match tokio::time::timeout(remaining, self.read_line()).await {
                Err(_) => break IdleEvent::Timeout,
                Ok(Ok(line)) => {
                    if let Some(exists) = parse_exists(&line) {
                        break IdleEvent::NewMail { exists };
                    }
                    // EXPUNGE and flag updates re-arm silently
                }
                Ok(Err(e)) => return Err(e),
            }
        };

        self.send("DONE\r\n").await?;
        let tagged = format!("{tag} ");
        loop {
            let line = self.read_line().await?;
            if line.starts_with(&tagged) {
                if line[tagged.len()..].trim_start().starts_with("OK") {
                    break;
                }
                return Err(MailError::Protocol(format!("IDLE termination failed: {line}")));
            }
        }
        Ok(event)
    }

    async fn logout(&mut self) {
        let _ = self.command("LOGOUT").await;
    }
}

// ── Response parsing helpers ────────────────────────────────────────

/// Quote a string for an IMAP command argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Parse `* <n> EXISTS` untagged responses.
fn parse_exists(line: &str) -> Option<u32> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "*" {
        return None;
    }
    let n: u32 = parts.next()?.parse().ok()?;
    if parts.next()? == "EXISTS" && parts.next().is_none() {
        Some(n)
    } else {
        None
    }
}

/// Length of the literal a response line announces, if any (`... {123}`).
fn parse_literal_len(line: &str) -> Option<usize> {
    let line = line.strip_suffix('}')?;
    let open = line.rfind('{')?;
    line[open + 1..].parse().ok()
}

/// IMAP search date: `05-Feb-2024`.
fn imap_date(date: &NaiveDate) -> String {
    date.format("%d-%b-%Y").to_string()
}

// ── Mailbox implementation ──────────────────────────────────────────

/// An authenticated IMAP mailbox with INBOX selected.
///
/// Holds exactly one session; operations are serialized behind a mutex so
/// concurrent pipeline tasks never interleave protocol exchanges.
pub struct ImapMailbox {
    session: Mutex<ImapSession>,
    exists: u32,
}

impl ImapMailbox {
    /// Connect, authenticate and select INBOX.
    pub async fn connect(config: &MailConfig) -> Result<Self, MailError> {
        let mut session = ImapSession::connect(config).await?;
        session
            .login(&config.account, config.password.expose_secret())
            .await?;
        let exists = session.select_inbox().await?;
        debug!(host = %config.imap_host, exists, "Mailbox selected");
        Ok(Self {
            session: Mutex::new(session),
            exists,
        })
    }

    /// Best-effort LOGOUT; the session is unusable afterwards.
    pub async fn close(&self) {
        self.session.lock().await.logout().await;
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn list_ids(&self, selector: &MailboxSelector) -> Result<Vec<MessageId>, MailError> {
        let mut session = self.session.lock().await;
        match selector {
            MailboxSelector::Count { start, limit } => {
                let ids = session.search("ALL").await?;
                let window = count_window(ids.len(), *start, *limit);
                Ok(ids[window].to_vec())
            }
            MailboxSelector::DateRange { since, before } => {
                session
                    .search(&format!(
                        "SINCE {} BEFORE {}",
                        imap_date(since),
                        imap_date(before)
                    ))
                    .await
            }
        }
    }

    async fn fetch_raw(&self, id: MessageId) -> Result<RawMessage, MailError> {
        let bytes = self.session.lock().await.fetch_rfc822(id).await?;
        Ok(RawMessage { id, bytes })
    }

    async fn message_count(&self) -> Result<u32, MailError> {
        Ok(self.exists)
    }

    async fn idle_wait(&self, timeout: Duration) -> Result<IdleEvent, MailError> {
        self.session.lock().await.idle(timeout).await
    }
}

/// Opens fresh `ImapMailbox` sessions from a fixed config.
pub struct ImapConnector {
    config: MailConfig,
}

impl ImapConnector {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailboxConnector for ImapConnector {
    async fn connect(&self) -> Result<Arc<dyn Mailbox>, MailError> {
        Ok(Arc::new(ImapMailbox::connect(&self.config).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_line_parses() {
        assert_eq!(parse_exists("* 42 EXISTS"), Some(42));
        assert_eq!(parse_exists("* 42 EXPUNGE"), None);
        assert_eq!(parse_exists("A3 OK done"), None);
        assert_eq!(parse_exists("* 42 EXISTS trailing"), None);
    }

    #[test]
    fn literal_length_parses() {
        assert_eq!(parse_literal_len("* 1 FETCH (RFC822 {2048}"), Some(2048));
        assert_eq!(parse_literal_len("* 1 FETCH (RFC822 NIL)"), None);
        assert_eq!(parse_literal_len("* SEARCH 1 2 3"), None);
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
    }

    #[test]
    fn search_dates_use_imap_format() {
        let d = NaiveDate::from_ymd_opt(2024, 11, 6).unwrap();
        assert_eq!(imap_date(&d), "06-Nov-2024");
    }
}
