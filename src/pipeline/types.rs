//! Shared types for the classification pipeline.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::mailbox::MessageId;

// ── Parsed message ──────────────────────────────────────────────────

/// A decoded message — normalized headers plus the plain-text body.
///
/// The decoder guarantees header fields are fully decoded UTF-8 (no MIME
/// encoded-word artifacts) and `body` holds the first plain-text,
/// non-attachment part, or an empty string. Immutable once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cc: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
}

/// The exact payload rendered into the classifier prompt.
///
/// Built once per message, never mutated.
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub headers: String,
    pub body: String,
}

// ── Classification ──────────────────────────────────────────────────

/// Priority taxonomy from the classifier's response contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    MustComplete,
    Important,
    General,
    ReplyNeeded,
    #[default]
    Unknown,
}

impl Priority {
    /// Normalize response text by exact match; anything else is `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "必须完成" => Self::MustComplete,
            "重要通知" => Self::Important,
            "一般通知" => Self::General,
            "回复必要" => Self::ReplyNeeded,
            _ => Self::Unknown,
        }
    }

    /// Short label for logging and sorting.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MustComplete => "must-complete",
            Self::Important => "important",
            Self::General => "general",
            Self::ReplyNeeded => "reply-needed",
            Self::Unknown => "unknown",
        }
    }
}

/// Typed classification of one message.
///
/// Every field defaults when the corresponding response line is absent —
/// a sparse response is not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub priority: Priority,
    pub sender: String,
    pub recipient: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

// ── Sync results ────────────────────────────────────────────────────

/// What happened to one message on its way through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The full fetch → decode → classify → parse chain succeeded.
    Classified(Classification),
    /// Some stage failed; the reason is human-readable.
    Failed { reason: String },
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Classified(_) => "classified",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Unit delivered to the sink — exactly one per processed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Ordinal position in the run's id list. Progress reporting only.
    pub seq: usize,
    pub id: MessageId,
    pub date: Option<DateTime<Utc>>,
    pub outcome: SyncOutcome,
}

impl SyncResult {
    pub fn classified(
        seq: usize,
        id: MessageId,
        date: Option<DateTime<Utc>>,
        classification: Classification,
    ) -> Self {
        Self {
            seq,
            id,
            date,
            outcome: SyncOutcome::Classified(classification),
        }
    }

    pub fn failed(
        seq: usize,
        id: MessageId,
        date: Option<DateTime<Utc>>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            id,
            date,
            outcome: SyncOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

// ── Result sink ─────────────────────────────────────────────────────

/// Receives processed results.
///
/// Called once per message from a single consumer task — deliveries are
/// already serialized by the engine, so implementations never see two
/// calls racing.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn deliver(&self, result: SyncResult);
}

/// Logs each result; failures surface at warn level.
pub struct LogSink;

#[async_trait]
impl ResultSink for LogSink {
    async fn deliver(&self, result: SyncResult) {
        match &result.outcome {
            SyncOutcome::Classified(c) => {
                info!(
                    id = result.id,
                    category = %c.category,
                    priority = c.priority.label(),
                    schedule = c.schedule.as_deref().unwrap_or(""),
                    summary = %c.summary,
                    "Classified message"
                );
            }
            SyncOutcome::Failed { reason } => {
                warn!(id = result.id, %reason, "Message failed");
            }
        }
    }
}

/// Collects results in memory, in delivery order.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<SyncResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<SyncResult> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn deliver(&self, result: SyncResult) {
        self.results.lock().unwrap().push(result);
    }
}
