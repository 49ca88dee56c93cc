//! Typed input fields: storage keys, rendering and submit semantics.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::helpers::html_escape;
use crate::options::{FALSE_VALUE, OptionStore, StoreError, TRUE_VALUE, is_truthy};

/// Errors from field configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("field '{name}' has no name prefix; attach it to a section first")]
    MissingPrefix { name: String },

    #[error("field '{name}' already has the name prefix '{existing}'")]
    PrefixAlreadySet { name: String, existing: String },
}

/// What an absent checkbox key means in a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckboxAbsence {
    /// Leave the stored value untouched.
    Unchanged,
    /// Store the unchecked value.
    #[default]
    ExplicitFalse,
}

/// Field variants with variant-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Single-line text input.
    Text,

    /// Masked input that never echoes the stored value.
    Password,

    /// On/off checkbox.
    Checkbox {
        #[serde(default)]
        absent: CheckboxAbsence,
    },

    /// Multi-line formatted text.
    RichText { rows: u32 },
}

impl FieldKind {
    /// Get the type name as a string.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Password => "password",
            FieldKind::Checkbox { .. } => "checkbox",
            FieldKind::RichText { .. } => "rich_text",
        }
    }
}

/// How a submission affects a field's stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWrite {
    /// Store this value.
    Write(String),
    /// Keep whatever is stored.
    Unchanged,
}

/// One configurable value on a settings page or metabox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    /// Field variant.
    #[serde(flatten)]
    pub kind: FieldKind,

    /// Unprefixed field name.
    pub name: String,

    /// Label shown next to the control.
    pub label: String,

    /// Optional help text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Namespace set by the owning section.
    #[serde(skip_serializing_if = "Option::is_none")]
    name_prefix: Option<String>,
}

impl InputField {
    /// Create a text field.
    pub fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(FieldKind::Text, name, label)
    }

    /// Create a password field.
    pub fn password(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(FieldKind::Password, name, label)
    }

    /// Create a checkbox; an absent key stores the unchecked value.
    pub fn checkbox(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(
            FieldKind::Checkbox {
                absent: CheckboxAbsence::default(),
            },
            name,
            label,
        )
    }

    /// Create a rich text editor field.
    pub fn rich_text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(FieldKind::RichText { rows: 10 }, name, label)
    }

    fn new(kind: FieldKind, name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            label: label.into(),
            description: None,
            name_prefix: None,
        }
    }

    /// Set the help text.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set what an absent checkbox means. No effect on other variants.
    pub fn when_absent(mut self, policy: CheckboxAbsence) -> Self {
        if let FieldKind::Checkbox { ref mut absent } = self.kind {
            *absent = policy;
        }
        self
    }

    /// Set the editor height for rich text. No effect on other variants.
    pub fn rows(mut self, count: u32) -> Self {
        if let FieldKind::RichText { ref mut rows } = self.kind {
            *rows = count;
        }
        self
    }

    /// Set the namespace. A prefix can only be set once.
    pub fn set_name_prefix(&mut self, prefix: impl Into<String>) -> Result<&mut Self, FieldError> {
        if let Some(existing) = &self.name_prefix {
            return Err(FieldError::PrefixAlreadySet {
                name: self.name.clone(),
                existing: existing.clone(),
            });
        }
        self.name_prefix = Some(prefix.into());
        Ok(self)
    }

    /// The namespace, if set.
    pub fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }

    /// Storage key: `{prefix}_{name}`.
    pub fn prefixed_name(&self) -> Result<String, FieldError> {
        match &self.name_prefix {
            Some(prefix) => Ok(format!("{prefix}_{}", self.name)),
            None => Err(FieldError::MissingPrefix {
                name: self.name.clone(),
            }),
        }
    }

    /// Render the control with the value currently in the option store.
    pub fn render(&self, store: &OptionStore) -> Result<String, FormError> {
        let key = self.prefixed_name()?;
        let current = store.get(&key)?;
        Ok(self.render_control(&key, current.as_deref()))
    }

    /// Render the control under `input_name` for a given current value.
    ///
    /// Values are escaped; password controls are always rendered empty.
    pub fn render_control(&self, input_name: &str, current: Option<&str>) -> String {
        let name = html_escape(input_name);
        let value = html_escape(current.unwrap_or_default());

        match &self.kind {
            FieldKind::Text => format!(
                r#"<input type="text" class="regular-text" id="{name}" name="{name}" value="{value}">"#
            ),
            FieldKind::Password => format!(
                r#"<input type="password" class="regular-text" id="{name}" name="{name}" value="" autocomplete="new-password">"#
            ),
            FieldKind::Checkbox { .. } => {
                let checked = if current.is_some_and(is_truthy) {
                    " checked"
                } else {
                    ""
                };
                format!(
                    r#"<input type="hidden" name="{name}" value="0"><input type="checkbox" id="{name}" name="{name}" value="1"{checked}>"#
                )
            }
            FieldKind::RichText { rows } => format!(
                r#"<textarea class="large-text" rows="{rows}" id="{name}" name="{name}">{value}</textarea>"#
            ),
        }
    }

    /// Classify the submitted value for this field.
    pub fn classify(&self, submitted: Option<&str>) -> FieldWrite {
        match (&self.kind, submitted) {
            (FieldKind::Password, Some("")) => FieldWrite::Unchanged,
            (FieldKind::Checkbox { .. }, Some(value)) => FieldWrite::Write(checkbox_value(value)),
            (FieldKind::Checkbox { absent }, None) => match absent {
                CheckboxAbsence::Unchanged => FieldWrite::Unchanged,
                CheckboxAbsence::ExplicitFalse => FieldWrite::Write(FALSE_VALUE.to_string()),
            },
            (_, Some(value)) => FieldWrite::Write(value.to_string()),
            (_, None) => FieldWrite::Unchanged,
        }
    }

    /// Classify this field's value in a submission keyed by `input_name`.
    pub fn submitted_value(
        &self,
        input_name: &str,
        payload: &HashMap<String, String>,
    ) -> FieldWrite {
        self.classify(payload.get(input_name).map(String::as_str))
    }
}

fn checkbox_value(submitted: &str) -> String {
    if is_truthy(submitted) {
        TRUE_VALUE.to_string()
    } else {
        FALSE_VALUE.to_string()
    }
}

/// Errors from rendering or storing a field.
#[derive(Debug, Error)]
pub enum FormError {
    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
