//! Log of sent mail, stored as host records with per-record meta.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Mailer, OutgoingMail};
use crate::config::BuilderConfig;
use crate::form::InputField;
use crate::helpers::{html_escape, strip_tags};
use crate::metabox::{MetaStore, Metabox, MetaboxError, Record, RegisteredMetabox};

pub const META_RECIPIENT: &str = "email_properties_recipient";
pub const META_ATTACHMENTS: &str = "email_properties_attachments";
pub const META_HEADERS: &str = "email_properties_headers";

/// Title of a logged mail without a subject.
pub const NO_SUBJECT: &str = "(no subject)";

/// Content of a logged mail without a body.
pub const NO_CONTENT: &str = "(no content)";

const EXCERPT_CHARS: usize = 150;

/// Record type of logged mail: `{prefix}_sent_email`.
pub fn sent_email_type(config: &BuilderConfig) -> String {
    config.prefixed('_', "sent_email")
}

/// The "Email properties" metabox shown on logged mail.
pub fn email_properties_metabox(config: &BuilderConfig) -> Result<RegisteredMetabox, MetaboxError> {
    let record_type = sent_email_type(config);
    Metabox::new(config, "email_properties", "Email properties", &[record_type.as_str()])
        .field_prefix("email_properties", '_')
        .field(InputField::text("recipient", "Recipient"))
        .field(InputField::rich_text("attachments", "Attachments").rows(3))
        .field(InputField::rich_text("headers", "Headers").rows(3))
        .create()
}

/// One logged mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMail {
    pub record: Record,
    pub title: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl SentMail {
    /// Title and content for a mail, with placeholders for empty values.
    pub fn title_and_content(mail: &OutgoingMail) -> (String, String) {
        let title = if mail.subject.trim().is_empty() {
            NO_SUBJECT.to_string()
        } else {
            mail.subject.clone()
        };
        let content = if mail.body.trim().is_empty() {
            NO_CONTENT.to_string()
        } else {
            mail.body.clone()
        };
        (title, content)
    }

    /// Meta values stored for a mail. Lists are joined with newlines.
    pub fn meta_values(mail: &OutgoingMail) -> [(&'static str, String); 3] {
        [
            (META_RECIPIENT, mail.to.clone()),
            (META_ATTACHMENTS, mail.attachments.join("\n")),
            (META_HEADERS, mail.headers.join("\n")),
        ]
    }

    /// Plain-text content cut to 150 characters.
    pub fn excerpt(&self) -> String {
        excerpt(&self.content)
    }
}

/// Cells of the sent mail overview, ready for HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMailColumns {
    pub recipient: String,
    pub content: String,
    pub attachments: String,
    pub headers: String,
}

/// Logged mail plus the meta store holding their properties.
pub struct SentMailLog {
    record_type: String,
    meta: Arc<dyn MetaStore>,
    next_id: AtomicU64,
    entries: RwLock<Vec<SentMail>>,
}

impl std::fmt::Debug for SentMailLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentMailLog")
            .field("record_type", &self.record_type)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl SentMailLog {
    /// Create an empty log writing meta to `meta`.
    pub fn new(config: &BuilderConfig, meta: Arc<dyn MetaStore>) -> Self {
        Self {
            record_type: sent_email_type(config),
            meta,
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    /// Store a mail as a new record.
    pub fn record(&self, mail: &OutgoingMail) -> Result<SentMail> {
        let record = Record::new(self.next_id.fetch_add(1, Ordering::Relaxed), &self.record_type);
        for (key, value) in SentMail::meta_values(mail) {
            self.meta.set_meta(record.id, key, &value)?;
        }

        let (title, content) = SentMail::title_and_content(mail);
        let entry = SentMail {
            record,
            title,
            content,
            sent_at: Utc::now(),
        };
        debug!(record_id = entry.record.id, "logged sent mail");
        self.entries.write().push(entry.clone());
        Ok(entry)
    }

    /// All logged mail, oldest first.
    pub fn entries(&self) -> Vec<SentMail> {
        self.entries.read().clone()
    }

    pub fn get(&self, record_id: u64) -> Option<SentMail> {
        self.entries
            .read()
            .iter()
            .find(|e| e.record.id == record_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Overview cells for one logged mail.
    pub fn columns(&self, record_id: u64) -> Result<Option<SentMailColumns>> {
        let Some(entry) = self.get(record_id) else {
            return Ok(None);
        };
        let meta = |key: &str| -> Result<String> {
            Ok(self.meta.get_meta(record_id, key)?.unwrap_or_default())
        };

        Ok(Some(SentMailColumns {
            recipient: html_escape(&meta(META_RECIPIENT)?),
            content: entry.excerpt(),
            attachments: list_cell(&meta(META_ATTACHMENTS)?),
            headers: list_cell(&meta(META_HEADERS)?),
        }))
    }
}

/// Strip markup and cut to 150 characters, marking the cut with `...`.
pub(crate) fn excerpt(content: &str) -> String {
    let text = strip_tags(content);
    if text.chars().count() > EXCERPT_CHARS {
        let cut: String = text.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}...")
    } else {
        text
    }
}

/// Escaped newline-separated list, `-` when empty.
fn list_cell(value: &str) -> String {
    let escaped = html_escape(value);
    if escaped.trim().is_empty() {
        return "-".to_string();
    }
    escaped.replace('\n', "<br><br>")
}

/// Records every message in a [`SentMailLog`] before handing it on.
pub struct LoggingMailer {
    inner: Arc<dyn Mailer>,
    log: Arc<SentMailLog>,
}

impl LoggingMailer {
    pub fn new(inner: Arc<dyn Mailer>, log: Arc<SentMailLog>) -> Self {
        Self { inner, log }
    }
}

impl Mailer for LoggingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<()> {
        if let Err(e) = self.log.record(mail) {
            warn!(error = %e, "failed to log sent mail");
        }
        self.inner.send(mail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::form::{CsrfIssuer, CsrfTokens};
    use crate::metabox::{MemoryMetaStore, RecordSubmission, SaveOutcome};

    struct Accept;

    impl Mailer for Accept {
        fn send(&self, _mail: &OutgoingMail) -> Result<()> {
            Ok(())
        }
    }

    fn mail() -> OutgoingMail {
        OutgoingMail {
            to: "ops@example.com".to_string(),
            subject: "Report".to_string(),
            body: "<p>All good</p>".to_string(),
            headers: vec!["From: Site <a@example.com>".to_string(), "X-Test: 1".to_string()],
            attachments: Vec::new(),
        }
    }

    #[test]
    fn record_type_uses_prefix() {
        assert_eq!(sent_email_type(&BuilderConfig::default()), "nw_sent_email");
        assert_eq!(sent_email_type(&BuilderConfig::new("acme")), "acme_sent_email");
    }

    #[test]
    fn placeholders_for_empty_mail() {
        let (title, content) = SentMail::title_and_content(&OutgoingMail::default());
        assert_eq!(title, NO_SUBJECT);
        assert_eq!(content, NO_CONTENT);

        let (title, content) = SentMail::title_and_content(&mail());
        assert_eq!(title, "Report");
        assert_eq!(content, "<p>All good</p>");
    }

    #[test]
    fn logging_mailer_records_meta() {
        let meta = Arc::new(MemoryMetaStore::new());
        let log = Arc::new(SentMailLog::new(&BuilderConfig::default(), meta.clone()));
        let mailer = LoggingMailer::new(Arc::new(Accept), log.clone());

        mailer.send(&mail()).unwrap();
        mailer.send(&OutgoingMail::default()).unwrap();

        assert_eq!(log.len(), 2);
        let first = &log.entries()[0];
        assert_eq!(first.record.record_type, "nw_sent_email");
        assert_eq!(first.title, "Report");
        assert_eq!(
            meta.get_meta(first.record.id, META_RECIPIENT).unwrap().as_deref(),
            Some("ops@example.com")
        );
        assert_eq!(
            meta.get_meta(first.record.id, META_HEADERS).unwrap().as_deref(),
            Some("From: Site <a@example.com>\nX-Test: 1")
        );
        assert_ne!(log.entries()[1].record.id, first.record.id);
    }

    #[test]
    fn columns() {
        let meta = Arc::new(MemoryMetaStore::new());
        let log = SentMailLog::new(&BuilderConfig::default(), meta);
        let entry = log.record(&mail()).unwrap();

        let columns = log.columns(entry.record.id).unwrap().unwrap();
        assert_eq!(columns.recipient, "ops@example.com");
        assert_eq!(columns.content, "All good");
        assert_eq!(columns.attachments, "-");
        assert_eq!(
            columns.headers,
            "From: Site &lt;a@example.com&gt;<br><br>X-Test: 1"
        );
        assert!(log.columns(999).unwrap().is_none());
    }

    #[test]
    fn excerpt_is_cut_at_150_chars() {
        let long = "é".repeat(200);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), 153);
        assert!(cut.ends_with("..."));

        let exact = "a".repeat(150);
        assert_eq!(excerpt(&exact), exact);
    }

    #[test]
    fn properties_metabox_edits_logged_mail() {
        let config = BuilderConfig::default();
        let metabox = email_properties_metabox(&config).unwrap();
        assert_eq!(metabox.id(), "nw-email_properties");
        assert_eq!(
            metabox.meta_keys(),
            vec![META_RECIPIENT, META_ATTACHMENTS, META_HEADERS]
        );

        let meta = MemoryMetaStore::new();
        let record = Record::new(1, sent_email_type(&config));
        let tokens = CsrfTokens::default();
        let token = tokens.issue(metabox.token_field());
        let payload = HashMap::from([
            (META_RECIPIENT.to_string(), "new@example.com".to_string()),
            (metabox.token_field().to_string(), token),
        ]);
        let outcome = metabox
            .save(
                &record,
                &RecordSubmission {
                    payload: &payload,
                    autosave: false,
                    csrf: &tokens,
                },
                &meta,
            )
            .unwrap();

        assert_eq!(
            outcome,
            SaveOutcome::Saved {
                written: vec![META_RECIPIENT.to_string()],
                unchanged: vec![META_ATTACHMENTS.to_string(), META_HEADERS.to_string()],
            }
        );
        assert_eq!(
            meta.get_meta(1, META_RECIPIENT).unwrap().as_deref(),
            Some("new@example.com")
        );
    }
}
