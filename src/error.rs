//! Error types for mail-assist.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mail(#[from] MailError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid mailbox selector: {0}")]
    InvalidSelector(String),
}

/// Mailbox/IMAP errors.
///
/// Only `Auth` is fatal to a whole run; `Fetch` is per-message and the batch
/// continues past it. The rest tear down the current session and are
/// recoverable by reconnecting.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed for {account}: {reason}")]
    Auth { account: String, reason: String },

    #[error("Connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Fetch failed for message {id}: {reason}")]
    Fetch { id: u32, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classifier service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
