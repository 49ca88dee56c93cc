//! The SMTP settings page and the option hooks behind it.

use std::sync::Arc;

use tracing::info;

use super::{Mailer, OutgoingMail};
use crate::config::BuilderConfig;
use crate::crypto::SecretCipher;
use crate::form::InputField;
use crate::helpers::nl2br;
use crate::host::{Notice, NoticeQueue};
use crate::options::{OptionStore, SecureOptionBinding, TriggerBinding, WriteContext};
use crate::settings::{SettingsPage, SettingsSection};

pub const SMTP_ENABLE: &str = "smtp_enable";
pub const SMTP_HOST: &str = "smtp_host";
pub const SMTP_PORT: &str = "smtp_port";
pub const SMTP_ENCRYPTION: &str = "smtp_encryption";
pub const SMTP_USERNAME: &str = "smtp_username";
pub const SMTP_PASSWORD: &str = "smtp_password";
pub const SMTP_TEST_RECIPIENT: &str = "smtp_test_recipient";
pub const SMTP_TEST_SUBJECT: &str = "smtp_test_subject";
pub const SMTP_TEST_CONTENT: &str = "smtp_test_content";
pub const SMTP_TEST_ENABLE: &str = "smtp_test_enable";

/// Notice queued after the test mail went out.
pub const TEST_MAIL_SENT: &str = "The testmail was sent successfully.";

/// Site details used in the test mail headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    pub name: String,
    pub admin_email: String,
    pub charset: String,
}

impl SiteIdentity {
    /// Identity with the UTF-8 charset.
    pub fn new(name: impl Into<String>, admin_email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin_email: admin_email.into(),
            charset: "UTF-8".to_string(),
        }
    }
}

/// The "SMTP settings" page under the general options menu.
///
/// Field order matters: the test recipient, subject and content are stored
/// before the send trigger fires, so a test mail uses the values submitted
/// with it.
pub fn smtp_settings_page(config: BuilderConfig) -> SettingsPage {
    SettingsPage::new(config)
        .parent_slug("options-general.php")
        .page_title("SMTP settings")
        .section(
            SettingsSection::new("smtp", "SMTP values")
                .field(InputField::checkbox("enable", "Enable SMTP?"))
                .field(InputField::text("host", "Host"))
                .field(InputField::text("port", "Port"))
                .field(InputField::text("encryption", "Encryption"))
                .field(InputField::text("username", "Username"))
                .field(
                    InputField::password("password", "Password")
                        .description("Encryption is used to store the password"),
                ),
        )
        .section(
            SettingsSection::new("smtp_test", "Test settings")
                .field(InputField::text("recipient", "Recipient"))
                .field(InputField::text("subject", "Subject"))
                .field(InputField::rich_text("content", "Content"))
                .field(
                    InputField::checkbox("enable", "Send testmail?").description(
                        "If checked, a testmail will be sent when saving these settings",
                    ),
                ),
        )
}

/// Build the test mail from the stored `smtp_test_*` options.
pub fn test_mail(
    option: impl Fn(&str) -> Option<String>,
    site: &SiteIdentity,
) -> OutgoingMail {
    let content = option(SMTP_TEST_CONTENT).unwrap_or_default();
    OutgoingMail {
        to: option(SMTP_TEST_RECIPIENT).unwrap_or_default(),
        subject: option(SMTP_TEST_SUBJECT).unwrap_or_default(),
        body: nl2br(&content),
        headers: vec![
            format!("Content-Type: text/html; charset={}", site.charset),
            format!("From: {} <{}>", site.name, site.admin_email),
        ],
        attachments: Vec::new(),
    }
}

/// Encrypt the SMTP password at rest and turn the "send testmail" checkbox
/// into a trigger that sends a test mail.
///
/// The outcome of a test mail is reported through `notices`.
pub fn install_option_hooks(
    store: &mut OptionStore,
    cipher: SecretCipher,
    mailer: Arc<dyn Mailer>,
    notices: Arc<dyn NoticeQueue>,
    site: SiteIdentity,
) {
    SecureOptionBinding::new(SMTP_PASSWORD, cipher).install(store);

    TriggerBinding::new(SMTP_TEST_ENABLE, move |ctx: &WriteContext<'_>| {
        let mail = test_mail(|key| ctx.option(key), &site);
        match mailer.send(&mail) {
            Ok(()) => {
                info!(to = %mail.to, "sent test mail");
                notices.push(Notice::success(TEST_MAIL_SENT));
                Ok(())
            }
            Err(e) => {
                notices.push(Notice::error(format!(
                    "An error occurred when trying to send the testmail: {e}"
                )));
                Err(e.context("failed to send test mail"))
            }
        }
    })
    .install(store);
}
