//! Mail configuration: the SMTP settings page, its option hooks, transport
//! resolution and the sent-mail log.
//!
//! Delivery itself belongs to the host. adminkit hands finished messages to
//! a [`Mailer`] and reads the transport settings back out of the option
//! store.

mod sent;
mod settings;
mod transport;

use serde::{Deserialize, Serialize};

pub use sent::{
    LoggingMailer, META_ATTACHMENTS, META_HEADERS, META_RECIPIENT, NO_CONTENT, NO_SUBJECT,
    SentMail, SentMailColumns, SentMailLog, email_properties_metabox, sent_email_type,
};
pub use settings::{
    SMTP_ENABLE, SMTP_ENCRYPTION, SMTP_HOST, SMTP_PASSWORD, SMTP_PORT, SMTP_TEST_CONTENT,
    SMTP_TEST_ENABLE, SMTP_TEST_RECIPIENT, SMTP_TEST_SUBJECT, SMTP_USERNAME, SiteIdentity,
    TEST_MAIL_SENT, install_option_hooks, smtp_settings_page, test_mail,
};
pub use transport::{DEFAULT_SMTP_PORT, SmtpCredentials, SmtpEncryption, SmtpTransport};

/// A message handed to the host for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    /// HTML body.
    pub body: String,
    /// Raw header lines, e.g. `From: Site <admin@example.com>`.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Attachment paths.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Hands messages to the host's mail transport.
pub trait Mailer: Send + Sync {
    /// Deliver a message.
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}
