//! SMTP transport settings resolved from stored options.

use serde::Serialize;
use tracing::warn;

use super::settings::{
    SMTP_ENABLE, SMTP_ENCRYPTION, SMTP_HOST, SMTP_PASSWORD, SMTP_PORT, SMTP_USERNAME,
};
use crate::options::{OptionStore, StoreError};

/// Port used when none (or an invalid one) is stored.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP connection security mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpEncryption {
    /// Plain connection.
    #[default]
    None,
    /// Upgrade a plain connection with STARTTLS.
    StartTls,
    /// TLS from the first byte.
    Tls,
}

impl SmtpEncryption {
    /// Parse the stored encryption option.
    ///
    /// `ssl` means implicit TLS and `tls` means STARTTLS. Unknown values fall
    /// back to a plain connection.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ssl" | "smtps" => SmtpEncryption::Tls,
            "tls" | "starttls" => SmtpEncryption::StartTls,
            "" | "none" => SmtpEncryption::None,
            other => {
                warn!(value = %other, "unknown SMTP encryption; using a plain connection");
                SmtpEncryption::None
            }
        }
    }
}

/// SMTP login.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolved SMTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpTransport {
    pub host: String,
    pub port: u16,
    pub encryption: SmtpEncryption,
    /// Present when a username or password is stored.
    pub credentials: Option<SmtpCredentials>,
}

impl SmtpTransport {
    /// Read the transport settings, or `None` when SMTP is not enabled.
    ///
    /// The password passes through the store's read hooks, so a secret
    /// binding yields the plaintext here.
    pub fn from_options(store: &OptionStore) -> Result<Option<Self>, StoreError> {
        if !store.is_truthy(SMTP_ENABLE)? {
            return Ok(None);
        }

        let host = store.get_or_empty(SMTP_HOST)?;
        let port_value = store.get_or_empty(SMTP_PORT)?;
        let port = match port_value.trim() {
            "" => DEFAULT_SMTP_PORT,
            value => value.parse().unwrap_or_else(|_| {
                warn!(value = %value, default = DEFAULT_SMTP_PORT, "invalid SMTP port");
                DEFAULT_SMTP_PORT
            }),
        };
        let encryption = SmtpEncryption::parse(&store.get_or_empty(SMTP_ENCRYPTION)?);

        let username = store.get_or_empty(SMTP_USERNAME)?;
        let password = store.get_or_empty(SMTP_PASSWORD)?;
        let credentials = if username.is_empty() && password.is_empty() {
            None
        } else {
            Some(SmtpCredentials { username, password })
        };

        Ok(Some(Self {
            host,
            port,
            encryption,
            credentials,
        }))
    }

    /// Whether the server requires a login.
    pub fn requires_auth(&self) -> bool {
        self.credentials.is_some()
    }
}
