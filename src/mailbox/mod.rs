//! Mailbox access — selection policies and the client seam.
//!
//! `Mailbox` is the boundary the pipeline talks to: list ids under a
//! selector, fetch raw message blobs, and wait for new-mail notifications.
//! `imap::ImapMailbox` is the real client; tests substitute their own.

pub mod decode;
pub mod imap;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{ConfigError, MailError};

/// Mailbox-assigned message identifier (IMAP sequence number).
pub type MessageId = u32;

/// A fetched message: opaque bytes plus the id they were fetched under.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub bytes: Vec<u8>,
}

/// Outcome of a bounded idle wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// The server announced new mail; `exists` is the new message count.
    NewMail { exists: u32 },
    /// The interval elapsed with nothing new.
    Timeout,
}

// ── Selection ───────────────────────────────────────────────────────

/// Which messages a sync run should cover.
///
/// Exactly one mode per run: a count window over the newest messages, or a
/// calendar date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailboxSelector {
    Count { start: usize, limit: usize },
    DateRange { since: NaiveDate, before: NaiveDate },
}

impl MailboxSelector {
    /// Count mode: skip the `start` newest messages, then take `limit`.
    pub fn count(start: usize, limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidSelector(
                "count mode requires limit > 0".into(),
            ));
        }
        Ok(Self::Count { start, limit })
    }

    /// Date-range mode: messages on or after `since` and strictly before
    /// `before`.
    pub fn date_range(since: NaiveDate, before: NaiveDate) -> Result<Self, ConfigError> {
        if since >= before {
            return Err(ConfigError::InvalidSelector(format!(
                "date range requires since < before (got {since} .. {before})"
            )));
        }
        Ok(Self::DateRange { since, before })
    }
}

/// Count-mode window over an ascending id list of length `len`.
///
/// The window is `[len - start - limit, len - start)` clamped to `[0, len]`,
/// mirroring the source system's negative-index slice. `start >= len` falls
/// back to the most-recent `limit` ids. The interior boundary behavior is
/// deliberately preserved as-is, off-by-one quirks included; see DESIGN.md.
pub fn count_window(len: usize, start: usize, limit: usize) -> std::ops::Range<usize> {
    if start >= len {
        return len.saturating_sub(limit)..len;
    }
    let end = len - start;
    let begin = len.saturating_sub(start + limit);
    begin..end
}

// ── Client seams ────────────────────────────────────────────────────

/// An authenticated mailbox session.
///
/// Implementations serialize access to the underlying connection; callers
/// may hold one instance per concern but must not expect concurrent
/// operations on a single session to overlap.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Resolve a selector to an ordered (ascending) id list.
    async fn list_ids(&self, selector: &MailboxSelector) -> Result<Vec<MessageId>, MailError>;

    /// Fetch one message's raw bytes.
    async fn fetch_raw(&self, id: MessageId) -> Result<RawMessage, MailError>;

    /// Message count observed when the mailbox was selected.
    async fn message_count(&self) -> Result<u32, MailError>;

    /// Wait up to `timeout` for a new-mail notification.
    async fn idle_wait(&self, timeout: Duration) -> Result<IdleEvent, MailError>;
}

/// Opens fresh mailbox sessions. The watch loop reconnects through this.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Mailbox>, MailError>;
}
