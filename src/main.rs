use std::sync::Arc;

use chrono::NaiveDate;

use mail_assist::config::MailConfig;
use mail_assist::error::ConfigError;
use mail_assist::llm::{LlmConfig, create_provider};
use mail_assist::mailbox::MailboxSelector;
use mail_assist::mailbox::imap::{ImapConnector, ImapMailbox};
use mail_assist::pipeline::classifier::EmailClassifier;
use mail_assist::pipeline::sync::SyncEngine;
use mail_assist::pipeline::types::{LogSink, ResultSink};
use mail_assist::pipeline::watch::{WatchConfig, WatchLoop};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mail_config = MailConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;
    let selector = selector_from_env()?;

    let concurrency: usize = std::env::var("MAIL_ASSIST_CONCURRENCY")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);

    let watch_enabled = std::env::var("MAIL_ASSIST_WATCH")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    eprintln!("mail-assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   IMAP: {}:{}", mail_config.imap_host, mail_config.imap_port);
    eprintln!("   Account: {}", mail_config.account);
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Selection: {:?}", selector);
    eprintln!("   Concurrency: {}", concurrency);
    eprintln!("   Watch: {}\n", if watch_enabled { "enabled" } else { "disabled" });

    let llm = create_provider(&llm_config)?;
    let classifier = Arc::new(EmailClassifier::new(llm));
    let sink: Arc<dyn ResultSink> = Arc::new(LogSink);

    // Foreground pass over the selected window.
    let mailbox = Arc::new(ImapMailbox::connect(&mail_config).await?);
    let engine = SyncEngine::new(
        mailbox.clone(),
        Arc::clone(&classifier),
        Arc::clone(&sink),
    );
    let report = engine.run(&selector, concurrency).await?;
    tracing::info!(
        processed = report.processed,
        failed = report.failed,
        "Initial sync finished"
    );
    mailbox.close().await;

    // Background watch over its own session.
    if watch_enabled {
        let connector = Arc::new(ImapConnector::new(mail_config));
        let watch = WatchLoop::new(connector, classifier, sink, WatchConfig::default());
        let handle = watch.start().expect("fresh watch loop must start");

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown requested");
        watch.stop();
        handle.await.ok();
    }

    Ok(())
}

/// Build the message selector from the environment: a date range when both
/// `MAIL_ASSIST_SINCE` and `MAIL_ASSIST_BEFORE` are set, otherwise a count
/// window (`MAIL_ASSIST_START`, default 0 / `MAIL_ASSIST_LIMIT`, default 10).
fn selector_from_env() -> Result<MailboxSelector, ConfigError> {
    let since = std::env::var("MAIL_ASSIST_SINCE").ok();
    let before = std::env::var("MAIL_ASSIST_BEFORE").ok();

    if let (Some(since), Some(before)) = (since, before) {
        let since = parse_date("MAIL_ASSIST_SINCE", &since)?;
        let before = parse_date("MAIL_ASSIST_BEFORE", &before)?;
        return MailboxSelector::date_range(since, before);
    }

    let start: usize = std::env::var("MAIL_ASSIST_START")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let limit: usize = std::env::var("MAIL_ASSIST_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);
    MailboxSelector::count(start, limit)
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected YYYY-MM-DD, got {raw}"),
    })
}
