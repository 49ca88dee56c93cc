//! Per-record metaboxes.
//!
//! A [`Metabox`] groups input fields shown on the edit screen of records of
//! one or more types. Values are stored per record through a [`MetaStore`]
//! under `{field prefix}{separator}{field name}`.

mod record;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tera::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use record::{MemoryMetaStore, MetaStore, Record};

use crate::config::BuilderConfig;
use crate::form::{CsrfIssuer, CsrfVerifier, FieldWrite, InputField};
use crate::theme::{self, FieldView, TemplateError};

/// Predicate deciding whether a metabox is shown for a record.
pub type ShowOnPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Screen area the metabox is placed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaboxContext {
    #[default]
    Normal,
    Side,
    Advanced,
}

/// Placement priority within the context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaboxPriority {
    #[default]
    High,
    Core,
    Default,
    Low,
}

/// Errors from defining or using a metabox.
#[derive(Debug, Error)]
pub enum MetaboxError {
    #[error("metabox id must not be empty")]
    EmptyId,

    #[error("metabox '{0}' has no record types")]
    NoRecordTypes(String),

    #[error("meta key '{0}' is used by more than one field")]
    DuplicateKey(String),

    #[error("failed to access meta '{key}' of record {record_id}")]
    Meta {
        record_id: u64,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// One save dispatch for a record.
pub struct RecordSubmission<'a> {
    /// Submitted form fields.
    pub payload: &'a HashMap<String, String>,

    /// Whether the host is autosaving a draft.
    pub autosave: bool,

    /// Token checker for the current session.
    pub csrf: &'a dyn CsrfVerifier,
}

impl std::fmt::Debug for RecordSubmission<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.payload.keys().collect();
        keys.sort();
        f.debug_struct("RecordSubmission")
            .field("payload_keys", &keys)
            .field("autosave", &self.autosave)
            .finish_non_exhaustive()
    }
}

/// Result of a save dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The record is not of a type this metabox is attached to.
    WrongRecordType,
    /// The metabox is not shown for this record.
    NotDisplayed,
    /// Autosaves never touch meta values.
    Autosave,
    /// The metabox form was not part of the submission.
    NotSubmitted,
    /// The submitted token did not verify.
    InvalidToken,
    Saved {
        written: Vec<String>,
        unchanged: Vec<String>,
    },
}

/// A metabox being configured.
#[derive(Clone)]
pub struct Metabox {
    id: String,
    title: String,
    record_types: Vec<String>,
    context: MetaboxContext,
    priority: MetaboxPriority,
    show_names: bool,
    closed: bool,
    show_on_ids: Vec<u64>,
    show_on_templates: Vec<String>,
    show_on_cb: Option<ShowOnPredicate>,
    field_prefix: String,
    field_separator: char,
    fields: Vec<InputField>,
}

impl std::fmt::Debug for Metabox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metabox")
            .field("id", &self.id)
            .field("record_types", &self.record_types)
            .field("fields", &self.fields.len())
            .field("show_on_cb", &self.show_on_cb.is_some())
            .finish_non_exhaustive()
    }
}

impl Metabox {
    /// Start a metabox with id `{prefix}-{id}` for the given record types.
    pub fn new(
        config: &BuilderConfig,
        id: &str,
        title: impl Into<String>,
        record_types: &[&str],
    ) -> Self {
        let id = if id.is_empty() {
            String::new()
        } else {
            config.prefixed('-', id)
        };
        Self {
            id,
            title: title.into(),
            record_types: record_types.iter().map(|t| t.to_string()).collect(),
            context: MetaboxContext::default(),
            priority: MetaboxPriority::default(),
            show_names: true,
            closed: false,
            show_on_ids: Vec::new(),
            show_on_templates: Vec::new(),
            show_on_cb: None,
            field_prefix: config.prefix.clone(),
            field_separator: '-',
            fields: Vec::new(),
        }
    }

    pub fn context(mut self, context: MetaboxContext) -> Self {
        self.context = context;
        self
    }

    pub fn priority(mut self, priority: MetaboxPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Show field labels next to the controls (default: true).
    pub fn show_names(mut self, show: bool) -> Self {
        self.show_names = show;
        self
    }

    /// Start collapsed.
    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }

    /// Only show on these record ids. Overrides the predicate.
    pub fn show_on_ids(mut self, ids: &[u64]) -> Self {
        self.show_on_ids = ids.to_vec();
        self
    }

    /// Only show on records using one of these templates. Overrides the
    /// predicate.
    pub fn show_on_templates(mut self, templates: &[&str]) -> Self {
        self.show_on_templates = templates.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Decide per record whether to show the metabox.
    pub fn show_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.show_on_cb = Some(Arc::new(predicate));
        self
    }

    /// Store values under `{prefix}{separator}{field name}` instead of
    /// `{config prefix}-{field name}`.
    pub fn field_prefix(mut self, prefix: impl Into<String>, separator: char) -> Self {
        self.field_prefix = prefix.into();
        self.field_separator = separator;
        self
    }

    /// Append a field.
    pub fn field(mut self, field: InputField) -> Self {
        self.fields.push(field);
        self
    }

    /// Validate the definition.
    pub fn create(self) -> Result<RegisteredMetabox, MetaboxError> {
        if self.id.is_empty() {
            return Err(MetaboxError::EmptyId);
        }
        if self.record_types.is_empty() {
            return Err(MetaboxError::NoRecordTypes(self.id));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in self.fields {
            let key = format!("{}{}{}", self.field_prefix, self.field_separator, field.name);
            if !seen.insert(key.clone()) {
                return Err(MetaboxError::DuplicateKey(key));
            }
            fields.push((key, field));
        }

        info!(
            id = %self.id,
            record_types = ?self.record_types,
            fields = fields.len(),
            "registered metabox"
        );

        Ok(RegisteredMetabox {
            token_field: format!("{}_nonce", self.id.replace('-', "_")),
            id: self.id,
            title: self.title,
            record_types: self.record_types,
            context: self.context,
            priority: self.priority,
            show_names: self.show_names,
            closed: self.closed,
            show_on_ids: self.show_on_ids,
            show_on_templates: self.show_on_templates,
            show_on_cb: self.show_on_cb,
            fields,
        })
    }
}

/// A validated metabox.
#[derive(Clone)]
pub struct RegisteredMetabox {
    id: String,
    title: String,
    record_types: Vec<String>,
    context: MetaboxContext,
    priority: MetaboxPriority,
    show_names: bool,
    closed: bool,
    show_on_ids: Vec<u64>,
    show_on_templates: Vec<String>,
    show_on_cb: Option<ShowOnPredicate>,
    token_field: String,
    /// Meta key and field, in display order.
    fields: Vec<(String, InputField)>,
}

impl std::fmt::Debug for RegisteredMetabox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredMetabox")
            .field("id", &self.id)
            .field("record_types", &self.record_types)
            .field("meta_keys", &self.meta_keys())
            .finish_non_exhaustive()
    }
}

impl RegisteredMetabox {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn record_types(&self) -> &[String] {
        &self.record_types
    }

    pub fn context(&self) -> MetaboxContext {
        self.context
    }

    pub fn priority(&self) -> MetaboxPriority {
        self.priority
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Name of the hidden form token input; also the token scope.
    pub fn token_field(&self) -> &str {
        &self.token_field
    }

    /// Meta keys in display order.
    pub fn meta_keys(&self) -> Vec<&str> {
        self.fields.iter().map(|(key, _)| key.as_str()).collect()
    }

    /// Whether the metabox is attached to the record's type.
    pub fn applies_to(&self, record: &Record) -> bool {
        self.record_types.iter().any(|t| *t == record.record_type)
    }

    /// Whether the metabox is shown for a record.
    ///
    /// An id or template allow-list takes precedence over the predicate.
    pub fn should_display(&self, record: &Record) -> bool {
        if !self.applies_to(record) {
            return false;
        }
        if !self.show_on_ids.is_empty() || !self.show_on_templates.is_empty() {
            return self.show_on_ids.contains(&record.id)
                || record
                    .template
                    .as_ref()
                    .is_some_and(|t| self.show_on_templates.contains(t));
        }
        self.show_on_cb.as_ref().is_none_or(|show| show(record))
    }

    /// Store submitted values for a record.
    ///
    /// Nothing is written unless the payload carries this metabox's token
    /// field and the token verifies.
    pub fn save(
        &self,
        record: &Record,
        submission: &RecordSubmission<'_>,
        meta: &dyn MetaStore,
    ) -> Result<SaveOutcome, MetaboxError> {
        if !self.applies_to(record) {
            return Ok(SaveOutcome::WrongRecordType);
        }
        if !self.should_display(record) {
            return Ok(SaveOutcome::NotDisplayed);
        }
        if submission.autosave {
            debug!(id = %self.id, record_id = record.id, "skipping autosave");
            return Ok(SaveOutcome::Autosave);
        }
        let Some(token) = submission.payload.get(&self.token_field) else {
            debug!(id = %self.id, record_id = record.id, "metabox form not submitted");
            return Ok(SaveOutcome::NotSubmitted);
        };
        if !submission.csrf.verify(&self.token_field, token) {
            warn!(id = %self.id, record_id = record.id, "metabox save with invalid token");
            return Ok(SaveOutcome::InvalidToken);
        }

        let mut written = Vec::new();
        let mut unchanged = Vec::new();
        for (key, field) in &self.fields {
            match field.submitted_value(key, submission.payload) {
                FieldWrite::Write(value) => {
                    meta.set_meta(record.id, key, &value)
                        .map_err(|source| MetaboxError::Meta {
                            record_id: record.id,
                            key: key.clone(),
                            source,
                        })?;
                    written.push(key.clone());
                }
                FieldWrite::Unchanged => unchanged.push(key.clone()),
            }
        }

        debug!(
            id = %self.id,
            record_id = record.id,
            written = written.len(),
            "saved metabox fields"
        );
        Ok(SaveOutcome::Saved { written, unchanged })
    }

    /// Render the fields for a record, or `None` when the metabox is not
    /// shown for it.
    pub fn render(
        &self,
        record: &Record,
        meta: &dyn MetaStore,
        csrf: &dyn CsrfIssuer,
    ) -> Result<Option<String>, MetaboxError> {
        if !self.should_display(record) {
            return Ok(None);
        }

        let mut fields = Vec::with_capacity(self.fields.len());
        for (key, field) in &self.fields {
            let current = meta
                .get_meta(record.id, key)
                .map_err(|source| MetaboxError::Meta {
                    record_id: record.id,
                    key: key.clone(),
                    source,
                })?;
            fields.push(FieldView {
                name: key.clone(),
                label: field.label.clone(),
                description: field.description.clone(),
                control: field.render_control(key, current.as_deref()),
            });
        }

        let mut context = Context::new();
        context.insert("metabox_id", &self.id);
        context.insert("show_names", &self.show_names);
        context.insert("token_field", &self.token_field);
        context.insert("token", &csrf.issue(&self.token_field));
        context.insert("fields", &fields);

        Ok(Some(theme::render(theme::METABOX_FIELDS, &context)?))
    }
}
