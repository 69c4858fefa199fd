//! Sync engine — drives fetch → decode → classify → parse over a bounded
//! worker pool.
//!
//! Workers only produce results; a single consumer task owns sink delivery
//! and progress accounting, so completions arriving out of order never race
//! on shared state. Per-message failures become `Failed` results and the
//! batch keeps going; only resolving the selector can abort a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::mailbox::decode::decode;
use crate::mailbox::{Mailbox, MailboxSelector, MessageId};
use crate::pipeline::classifier::EmailClassifier;
use crate::pipeline::parse;
use crate::pipeline::types::{ResultSink, SyncResult};

/// Summary of one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncReport {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
}

/// One mailbox sync pass: selector resolution plus the bounded pipeline.
pub struct SyncEngine {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<EmailClassifier>,
    sink: Arc<dyn ResultSink>,
    stopped: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<EmailClassifier>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            sink,
            stopped: AtomicBool::new(false),
        }
    }

    /// Prevent further classifier calls from being issued. Calls already in
    /// flight are allowed to complete and deliver.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Run one full pass. Restartable: each call performs a fresh mailbox
    /// query and clears any previous stop request.
    pub async fn run(
        &self,
        selector: &MailboxSelector,
        concurrency: usize,
    ) -> Result<SyncReport, MailError> {
        self.stopped.store(false, Ordering::Relaxed);
        let ids = self.mailbox.list_ids(selector).await?;
        info!(total = ids.len(), selector = ?selector, "Starting sync run");
        Ok(self.process_ids(&ids, concurrency).await)
    }

    /// Drive the pipeline over an explicit id list with at most
    /// `concurrency` in-flight messages. The watch loop reuses this for
    /// newly arrived mail.
    pub async fn process_ids(&self, ids: &[MessageId], concurrency: usize) -> SyncReport {
        let total = ids.len();
        if total == 0 {
            return SyncReport::default();
        }
        let concurrency = concurrency.max(1);

        let (tx, mut rx) = mpsc::channel::<SyncResult>(concurrency);

        let sink = Arc::clone(&self.sink);
        let consumer = tokio::spawn(async move {
            let mut processed = 0usize;
            let mut failed = 0usize;
            while let Some(result) = rx.recv().await {
                processed += 1;
                if result.outcome.is_failed() {
                    failed += 1;
                }
                debug!(
                    processed,
                    total,
                    id = result.id,
                    outcome = result.outcome.label(),
                    "Progress"
                );
                sink.deliver(result).await;
            }
            (processed, failed)
        });

        futures::stream::iter(ids.iter().copied().enumerate())
            .for_each_concurrent(concurrency, |(seq, id)| {
                let tx = tx.clone();
                async move {
                    if let Some(result) = self.process_one(seq, id).await {
                        if tx.send(result).await.is_err() {
                            warn!(id, "Result consumer dropped before delivery");
                        }
                    }
                }
            })
            .await;
        drop(tx);

        let (processed, failed) = consumer.await.unwrap_or((0, 0));
        info!(processed, failed, total, "Sync pass complete");
        SyncReport {
            total,
            processed,
            failed,
        }
    }

    /// One message through fetch → decode → classify → parse. Returns
    /// `None` when a stop request landed before the classifier call.
    async fn process_one(&self, seq: usize, id: MessageId) -> Option<SyncResult> {
        if self.stopped.load(Ordering::Relaxed) {
            debug!(id, "Skipping message after stop request");
            return None;
        }

        let raw = match self.mailbox.fetch_raw(id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id, error = %e, "Fetch failed; continuing batch");
                return Some(SyncResult::failed(seq, id, None, e.to_string()));
            }
        };

        let message = decode(&raw);
        let request = EmailClassifier::render_request(&message);

        if self.stopped.load(Ordering::Relaxed) {
            debug!(id, "Stop requested; withholding classifier call");
            return None;
        }

        let response = match self.classifier.classify(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(id, error = %e, "Classification failed; continuing batch");
                return Some(SyncResult::failed(seq, id, message.date, e.to_string()));
            }
        };

        let classification = parse::parse(&response);
        Some(SyncResult::classified(seq, id, message.date, classification))
    }
}
