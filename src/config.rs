//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// IMAP mailbox configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub account: String,
    pub password: SecretString,
}

impl MailConfig {
    /// Build config from environment variables.
    ///
    /// `MAIL_IMAP_HOST`, `MAIL_ACCOUNT` and `MAIL_PASSWORD` are required;
    /// `MAIL_IMAP_PORT` defaults to 993.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = std::env::var("MAIL_IMAP_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_IMAP_HOST".into()))?;

        let imap_port: u16 = match std::env::var("MAIL_IMAP_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAIL_IMAP_PORT".into(),
                message: format!("not a port number: {raw}"),
            })?,
            Err(_) => 993,
        };

        let account = std::env::var("MAIL_ACCOUNT")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_ACCOUNT".into()))?;

        let password = std::env::var("MAIL_PASSWORD")
            .map_err(|_| ConfigError::MissingEnvVar("MAIL_PASSWORD".into()))?;

        Ok(Self {
            imap_host,
            imap_port,
            account,
            password: SecretString::from(password),
        })
    }
}
