//! Mailbox watch loop — reacts to new mail as it arrives.
//!
//! An explicit state machine rather than a flag-checked sleep loop: the
//! background task connects, parks in IDLE, reacts to new-mail
//! notifications by running the newest messages through the sync path, and
//! backs off on failure. Connect failures retry quickly; a failure of an
//! established session waits out the longer backoff before reconnecting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::mailbox::{IdleEvent, MailboxConnector, MessageId};
use crate::pipeline::classifier::EmailClassifier;
use crate::pipeline::sync::SyncEngine;
use crate::pipeline::types::ResultSink;

/// Watch loop state, observable for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Connected,
    Idling,
    Reacting,
    Stopped,
}

/// Timing knobs for the watch loop.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How long one IDLE round waits before re-arming.
    pub idle_interval: Duration,
    /// Delay before retrying a failed connect.
    pub connect_retry_delay: Duration,
    /// Backoff after a failure of an established session.
    pub failure_backoff: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            // re-arm well under common server/NAT idle limits
            idle_interval: Duration::from_secs(170),
            connect_retry_delay: Duration::from_secs(5),
            failure_backoff: Duration::from_secs(60),
        }
    }
}

/// Long-lived new-mail watcher. One active loop per instance; `start()`
/// while a loop is running is a no-op.
pub struct WatchLoop {
    connector: Arc<dyn MailboxConnector>,
    classifier: Arc<EmailClassifier>,
    sink: Arc<dyn ResultSink>,
    config: WatchConfig,
    active: AtomicBool,
    shutdown: AtomicBool,
    state: Mutex<WatchState>,
}

impl WatchLoop {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        classifier: Arc<EmailClassifier>,
        sink: Arc<dyn ResultSink>,
        config: WatchConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            classifier,
            sink,
            config,
            active: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            state: Mutex::new(WatchState::Idle),
        })
    }

    /// Current state.
    pub fn state(&self) -> WatchState {
        *self.state.lock().unwrap()
    }

    /// Spawn the background loop. Returns `None` if a loop is already
    /// active for this instance.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Watch loop already active; ignoring start request");
            return None;
        }
        self.shutdown.store(false, Ordering::SeqCst);
        let this = Arc::clone(self);
        Some(tokio::spawn(async move { this.run().await }))
    }

    /// Request a stop. A reacting cycle in flight is allowed to finish; no
    /// new cycle begins.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn set_state(&self, state: WatchState) {
        *self.state.lock().unwrap() = state;
        debug!(state = ?state, "Watch state");
    }

    async fn run(&self) {
        info!(
            idle_interval = ?self.config.idle_interval,
            "Watch loop started"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.set_state(WatchState::Idle);

            // Connect phase — failures here are cheap to retry.
            let mailbox = match self.connector.connect().await {
                Ok(mailbox) => mailbox,
                Err(e) => {
                    warn!(error = %e, "Watch connect failed; retrying shortly");
                    tokio::time::sleep(self.config.connect_retry_delay).await;
                    continue;
                }
            };
            self.set_state(WatchState::Connected);

            let mut last_seen = match mailbox.message_count().await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "Could not read mailbox count; backing off");
                    self.set_state(WatchState::Idle);
                    tokio::time::sleep(self.config.failure_backoff).await;
                    continue;
                }
            };
            debug!(last_seen, "Watching for mail above current count");

            let engine = SyncEngine::new(
                Arc::clone(&mailbox),
                Arc::clone(&self.classifier),
                Arc::clone(&self.sink),
            );

            // Idle / react until shutdown or session failure.
            loop {
                if self.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                self.set_state(WatchState::Idling);

                match mailbox.idle_wait(self.config.idle_interval).await {
                    Ok(IdleEvent::Timeout) => {
                        // nothing new; re-arm
                    }
                    Ok(IdleEvent::NewMail { exists }) => {
                        if exists > last_seen {
                            self.set_state(WatchState::Reacting);
                            let new_ids: Vec<MessageId> = (last_seen + 1..=exists).collect();
                            info!(count = new_ids.len(), "New mail; classifying");
                            engine.process_ids(&new_ids, 1).await;
                        }
                        last_seen = exists;
                    }
                    Err(e) => {
                        error!(error = %e, "Idle failed; reconnecting after backoff");
                        self.set_state(WatchState::Idle);
                        tokio::time::sleep(self.config.failure_backoff).await;
                        break;
                    }
                }
            }
        }

        self.set_state(WatchState::Stopped);
        self.active.store(false, Ordering::SeqCst);
        info!("Watch loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_separates_backoffs() {
        let config = WatchConfig::default();
        assert!(config.failure_backoff > config.connect_retry_delay);
    }
}
