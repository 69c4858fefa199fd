//! mail-assist — IMAP inbox triage through LLM classification.

pub mod config;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
