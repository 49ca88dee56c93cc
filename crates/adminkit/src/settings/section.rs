//! Settings sections: a titled, ordered group of fields sharing a namespace.

use crate::form::{FieldError, InputField};

/// A named group of fields on a settings page.
///
/// The section id is the storage namespace of its fields: a field `host` in
/// section `smtp` is stored under `smtp_host`.
#[derive(Debug, Clone)]
pub struct SettingsSection {
    id: String,
    title: String,
    subtitle: Option<String>,
    fields: Vec<InputField>,
}

impl SettingsSection {
    /// Create an empty section.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subtitle: None,
            fields: Vec::new(),
        }
    }

    /// Set the text shown below the section title.
    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Append a field. Order is preserved.
    pub fn field(mut self, field: InputField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn subtitle_text(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> &[InputField] {
        &self.fields
    }

    /// Namespace every field with the section id.
    ///
    /// Returns the errors of fields that already carried a prefix.
    pub(crate) fn attach(&mut self) -> Vec<FieldError> {
        let id = self.id.clone();
        self.fields
            .iter_mut()
            .filter_map(|field| field.set_name_prefix(id.as_str()).err())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn fields_keep_insertion_order() {
        let section = SettingsSection::new("smtp", "SMTP values")
            .subtitle("Outgoing mail")
            .field(InputField::text("host", "Host"))
            .field(InputField::text("port", "Port"))
            .field(InputField::password("password", "Password"));

        let names: Vec<&str> = section.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["host", "port", "password"]);
        assert_eq!(section.subtitle_text(), Some("Outgoing mail"));
    }

    #[test]
    fn attach_prefixes_fields_with_section_id() {
        let mut section = SettingsSection::new("smtp_test", "Test settings")
            .field(InputField::text("recipient", "Recipient"))
            .field(InputField::checkbox("enable", "Send testmail?"));

        assert!(section.attach().is_empty());
        let keys: Vec<String> = section
            .fields()
            .iter()
            .map(|f| f.prefixed_name().unwrap())
            .collect();
        assert_eq!(keys, vec!["smtp_test_recipient", "smtp_test_enable"]);
    }

    #[test]
    fn attach_reports_already_prefixed_fields() {
        let mut taken = InputField::text("host", "Host");
        taken.set_name_prefix("other").unwrap();

        let mut section = SettingsSection::new("smtp", "SMTP values")
            .field(taken)
            .field(InputField::text("port", "Port"));

        let errors = section.attach();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            FieldError::PrefixAlreadySet { name, existing } if name == "host" && existing == "other"
        ));
        assert_eq!(section.fields()[1].prefixed_name().unwrap(), "smtp_port");
    }
}
