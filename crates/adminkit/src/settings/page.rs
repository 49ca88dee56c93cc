//! Settings page builder, registration, submit and render.

use std::collections::HashSet;

use serde::Serialize;
use tera::Context;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::SettingsSection;
use crate::config::BuilderConfig;
use crate::form::{CsrfIssuer, FieldError, FieldWrite, FormError, TOKEN_FIELD};
use crate::helpers::slugify;
use crate::host::{MenuEntry, MenuRegistrar, Notice, NoticeQueue, SubmitRequest};
use crate::options::{OptionStore, StoreError};
use crate::permissions::MANAGE_OPTIONS;
use crate::theme::{self, FieldView, TemplateError};

/// Title used when none is set.
pub const DEFAULT_PAGE_TITLE: &str = "Theme settings";

/// Menu icon used when none is set.
pub const DEFAULT_ICON: &str = "dashicons-admin-settings";

/// Label of the submit button.
pub const SUBMIT_LABEL: &str = "Save Changes";

/// Notice queued after a successful submit.
pub const SAVED_MESSAGE: &str = "Settings saved.";

/// Errors in a page definition, reported by [`SettingsPage::create`].
#[derive(Debug, Error)]
pub enum PageError {
    #[error("section id must not be empty")]
    EmptySectionId,

    #[error("section '{0}' is defined twice")]
    DuplicateSection(String),

    #[error("storage key '{0}' is used by more than one field")]
    DuplicateKey(String),

    #[error("page slug is empty; set a page slug or a title with letters or digits")]
    EmptySlug,

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Errors from rendering a registered page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Fatal submit failures. Nothing is written when one of these is returned.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("missing capability '{capability}'")]
    Forbidden { capability: String },

    #[error("invalid form token for '{scope}'")]
    InvalidToken { scope: String },

    #[error("failed to store '{key}'")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl SubmitError {
    /// Message shown to the user when the request is terminated.
    pub fn user_message(&self) -> &'static str {
        match self {
            SubmitError::Forbidden { .. } => {
                "You don't have the right permissions to update these settings."
            }
            SubmitError::InvalidToken { .. } => {
                "Invalid nonce value, please refresh the page and try again."
            }
            SubmitError::Store { .. } => "The settings could not be saved.",
        }
    }
}

/// Result of a submit dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The payload was empty; nothing was checked or written.
    NothingSubmitted,

    /// Every field was processed.
    Saved {
        /// Keys written, in field order.
        written: Vec<String>,
        /// Keys left untouched, in field order.
        unchanged: Vec<String>,
    },
}

/// A settings page being configured.
#[derive(Debug, Clone)]
pub struct SettingsPage {
    config: BuilderConfig,
    page_title: String,
    parent_slug: Option<String>,
    page_slug: Option<String>,
    capability: String,
    icon: String,
    menu_position: Option<i32>,
    sections: Vec<SettingsSection>,
    field_errors: Vec<FieldError>,
}

impl SettingsPage {
    /// Start a page with the default title, capability and icon.
    pub fn new(config: BuilderConfig) -> Self {
        Self {
            config,
            page_title: DEFAULT_PAGE_TITLE.to_string(),
            parent_slug: None,
            page_slug: None,
            capability: MANAGE_OPTIONS.to_string(),
            icon: DEFAULT_ICON.to_string(),
            menu_position: None,
            sections: Vec::new(),
            field_errors: Vec::new(),
        }
    }

    pub fn page_title(mut self, title: impl Into<String>) -> Self {
        self.page_title = title.into();
        self
    }

    /// Register as a sub-page of `parent` instead of a top-level page.
    pub fn parent_slug(mut self, parent: impl Into<String>) -> Self {
        self.parent_slug = Some(parent.into());
        self
    }

    pub fn page_slug(mut self, slug: impl Into<String>) -> Self {
        self.page_slug = Some(slug.into());
        self
    }

    /// Capability required to view and submit the page.
    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = capability.into();
        self
    }

    /// Menu icon; ignored for sub-pages.
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Menu position; ignored for sub-pages.
    pub fn menu_position(mut self, position: i32) -> Self {
        self.menu_position = Some(position);
        self
    }

    /// Append a section and namespace its fields with the section id.
    pub fn section(mut self, mut section: SettingsSection) -> Self {
        let errors = section.attach();
        self.field_errors.extend(errors);
        self.sections.push(section);
        self
    }

    /// Slug of the page: the explicit slug or the slugified title.
    pub fn resolved_slug(&self) -> String {
        self.page_slug
            .clone()
            .unwrap_or_else(|| slugify(&self.page_title))
    }

    /// Host-visible menu slug: `{prefix}-{page slug}`.
    pub fn menu_slug(&self) -> String {
        self.config.prefixed('-', &self.resolved_slug())
    }

    /// Check the definition without registering it.
    pub fn validate(&self) -> Result<(), PageError> {
        if let Some(error) = self.field_errors.first() {
            return Err(error.clone().into());
        }
        if self.resolved_slug().is_empty() {
            return Err(PageError::EmptySlug);
        }

        let mut section_ids = HashSet::new();
        let mut keys = HashSet::new();
        for section in &self.sections {
            if section.id().is_empty() {
                return Err(PageError::EmptySectionId);
            }
            if !section_ids.insert(section.id()) {
                return Err(PageError::DuplicateSection(section.id().to_string()));
            }
            for field in section.fields() {
                let key = field.prefixed_name()?;
                if !keys.insert(key.clone()) {
                    return Err(PageError::DuplicateKey(key));
                }
            }
        }
        Ok(())
    }

    /// Validate the page and register it with the host menu.
    pub fn create(self, registrar: &mut dyn MenuRegistrar) -> Result<RegisteredPage, PageError> {
        self.validate()?;

        let menu_slug = self.menu_slug();
        let top_level = self.parent_slug.is_none();
        registrar.register_page(MenuEntry {
            parent: self.parent_slug.clone(),
            page_title: self.page_title.clone(),
            menu_title: self.page_title.clone(),
            capability: self.capability.clone(),
            slug: menu_slug.clone(),
            icon: top_level.then(|| self.icon.clone()),
            position: if top_level { self.menu_position } else { None },
        });

        info!(
            slug = %menu_slug,
            parent = ?self.parent_slug,
            sections = self.sections.len(),
            "registered settings page"
        );

        Ok(RegisteredPage {
            menu_slug,
            page_title: self.page_title,
            capability: self.capability,
            sections: self.sections,
        })
    }
}

/// A validated page known to the host.
#[derive(Debug, Clone)]
pub struct RegisteredPage {
    menu_slug: String,
    page_title: String,
    capability: String,
    sections: Vec<SettingsSection>,
}

#[derive(Serialize)]
struct SectionView<'a> {
    title: &'a str,
    subtitle: Option<&'a str>,
    fields: Vec<FieldView>,
}

impl RegisteredPage {
    /// Menu slug; also the scope of the page's form tokens.
    pub fn menu_slug(&self) -> &str {
        &self.menu_slug
    }

    pub fn page_title(&self) -> &str {
        &self.page_title
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn sections(&self) -> &[SettingsSection] {
        &self.sections
    }

    /// Every storage key of the page, in field order.
    pub fn storage_keys(&self) -> Vec<String> {
        self.sections
            .iter()
            .flat_map(|s| s.fields())
            .filter_map(|f| f.prefixed_name().ok())
            .collect()
    }

    /// Process a form submission.
    ///
    /// Checks run in this order: empty payload, capability, form token. The
    /// fields are then written in section and field order and a success
    /// notice is queued.
    pub fn handle_submit(
        &self,
        request: &SubmitRequest<'_>,
        store: &OptionStore,
        notices: &dyn NoticeQueue,
    ) -> Result<SubmitOutcome, SubmitError> {
        if request.payload.is_empty() {
            return Ok(SubmitOutcome::NothingSubmitted);
        }

        if !request.capabilities.can(&self.capability) {
            warn!(slug = %self.menu_slug, capability = %self.capability, "settings submit forbidden");
            return Err(SubmitError::Forbidden {
                capability: self.capability.clone(),
            });
        }

        let token = request
            .payload
            .get(TOKEN_FIELD)
            .map(String::as_str)
            .unwrap_or_default();
        if !request.csrf.verify(&self.menu_slug, token) {
            warn!(slug = %self.menu_slug, "settings submit with invalid form token");
            return Err(SubmitError::InvalidToken {
                scope: self.menu_slug.clone(),
            });
        }

        let mut written = Vec::new();
        let mut unchanged = Vec::new();
        for field in self.sections.iter().flat_map(|s| s.fields()) {
            // Prefixes were checked by `create`.
            let Ok(key) = field.prefixed_name() else {
                continue;
            };
            match field.submitted_value(&key, request.payload) {
                FieldWrite::Write(value) => {
                    store.set(&key, &value).map_err(|source| SubmitError::Store {
                        key: key.clone(),
                        source,
                    })?;
                    written.push(key);
                }
                FieldWrite::Unchanged => {
                    debug!(key = %key, "field left unchanged");
                    unchanged.push(key);
                }
            }
        }

        notices.push(Notice::success(SAVED_MESSAGE));
        info!(
            slug = %self.menu_slug,
            written = written.len(),
            unchanged = unchanged.len(),
            "settings saved"
        );
        Ok(SubmitOutcome::Saved { written, unchanged })
    }

    /// Render the page with current values, a fresh form token and any
    /// pending notices.
    pub fn render(
        &self,
        store: &OptionStore,
        csrf: &dyn CsrfIssuer,
        notices: &dyn NoticeQueue,
    ) -> Result<String, RenderError> {
        let mut sections = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let fields = section
                .fields()
                .iter()
                .map(|field| {
                    Ok(FieldView {
                        name: field.prefixed_name()?,
                        label: field.label.clone(),
                        description: field.description.clone(),
                        control: field.render(store)?,
                    })
                })
                .collect::<Result<Vec<_>, FormError>>()?;
            sections.push(SectionView {
                title: section.title(),
                subtitle: section.subtitle_text(),
                fields,
            });
        }

        let mut context = Context::new();
        context.insert("page_title", &self.page_title);
        context.insert("notices", &notices.drain());
        context.insert("token_field", TOKEN_FIELD);
        context.insert("token", &csrf.issue(&self.menu_slug));
        context.insert("sections", &sections);
        context.insert("submit_label", SUBMIT_LABEL);

        Ok(theme::render(theme::SETTINGS_PAGE, &context)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::form::{CheckboxAbsence, CsrfTokens, CsrfVerifier, InputField};
    use crate::host::{MenuRegistry, NoticeLevel, Notices};
    use crate::permissions::Capabilities;

    fn smtp_page() -> SettingsPage {
        SettingsPage::new(BuilderConfig::default())
            .page_title("SMTP settings")
            .parent_slug("options-general.php")
            .section(
                SettingsSection::new("smtp", "SMTP values")
                    .field(InputField::checkbox("enable", "Enable SMTP?"))
                    .field(InputField::text("host", "Host"))
                    .field(InputField::password("password", "Password")),
            )
    }

    fn payload(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    struct Deny;

    impl CsrfVerifier for Deny {
        fn verify(&self, _scope: &str, _token: &str) -> bool {
            false
        }
    }

    #[test]
    fn defaults() {
        let page = SettingsPage::new(BuilderConfig::default());
        assert_eq!(page.resolved_slug(), "theme-settings");
        assert_eq!(page.menu_slug(), "nw-theme-settings");

        let mut registry = MenuRegistry::new();
        let registered = page.create(&mut registry).unwrap();
        let entry = registry.get("nw-theme-settings").unwrap();
        assert_eq!(entry.page_title, DEFAULT_PAGE_TITLE);
        assert_eq!(entry.capability, MANAGE_OPTIONS);
        assert_eq!(entry.icon.as_deref(), Some(DEFAULT_ICON));
        assert_eq!(registered.capability(), MANAGE_OPTIONS);
    }

    #[test]
    fn sub_page_registration() {
        let mut registry = MenuRegistry::new();
        let page = smtp_page().menu_position(5).page_slug("mail").create(&mut registry).unwrap();

        assert_eq!(page.menu_slug(), "nw-mail");
        let children = registry.children("options-general.php");
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].icon, None);
        assert_eq!(children[0].position, None);
        assert!(registry.top_level().is_empty());
    }

    #[test]
    fn storage_keys_follow_section_order() {
        let mut registry = MenuRegistry::new();
        let page = smtp_page().create(&mut registry).unwrap();
        assert_eq!(
            page.storage_keys(),
            vec!["smtp_enable", "smtp_host", "smtp_password"]
        );
    }

    #[test]
    fn duplicate_sections_are_rejected() {
        let page = smtp_page().section(SettingsSection::new("smtp", "Again"));
        assert!(matches!(
            page.create(&mut MenuRegistry::new()),
            Err(PageError::DuplicateSection(id)) if id == "smtp"
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let page = SettingsPage::new(BuilderConfig::default()).section(
            SettingsSection::new("smtp", "SMTP")
                .field(InputField::text("host", "Host"))
                .field(InputField::password("host", "Host again")),
        );
        assert!(matches!(
            page.validate(),
            Err(PageError::DuplicateKey(key)) if key == "smtp_host"
        ));
    }

    #[test]
    fn keys_colliding_across_sections_are_rejected() {
        // "a" + "b_c" and "a_b" + "c" both store under "a_b_c".
        let page = SettingsPage::new(BuilderConfig::default())
            .section(SettingsSection::new("a", "A").field(InputField::text("b_c", "x")))
            .section(SettingsSection::new("a_b", "AB").field(InputField::text("c", "y")));
        assert!(matches!(page.validate(), Err(PageError::DuplicateKey(_))));
    }

    #[test]
    fn empty_section_id_and_slug_are_rejected() {
        let page = SettingsPage::new(BuilderConfig::default()).section(SettingsSection::new("", "x"));
        assert!(matches!(page.validate(), Err(PageError::EmptySectionId)));

        let page = SettingsPage::new(BuilderConfig::default()).page_title("!!!");
        assert!(matches!(page.validate(), Err(PageError::EmptySlug)));
    }

    #[test]
    fn prefixed_fields_are_rejected_at_create() {
        let mut field = InputField::text("host", "Host");
        field.set_name_prefix("elsewhere").unwrap();
        let page = SettingsPage::new(BuilderConfig::default())
            .section(SettingsSection::new("smtp", "SMTP").field(field));
        assert!(matches!(
            page.create(&mut MenuRegistry::new()),
            Err(PageError::Field(FieldError::PrefixAlreadySet { .. }))
        ));
    }

    #[test]
    fn empty_payload_does_nothing() {
        let page = smtp_page().create(&mut MenuRegistry::new()).unwrap();
        let store = OptionStore::in_memory();
        let notices = Notices::new();
        let empty = HashMap::new();
        let caps = Capabilities::none();

        let outcome = page
            .handle_submit(&SubmitRequest::new(&empty, &caps, &Deny), &store, &notices)
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::NothingSubmitted);
        assert!(notices.is_empty());
    }

    #[test]
    fn forbidden_is_checked_before_token() {
        let page = smtp_page().create(&mut MenuRegistry::new()).unwrap();
        let store = OptionStore::in_memory();
        let notices = Notices::new();
        let data = payload(&[("smtp_host", "mx")]);
        let caps = Capabilities::from_list(&["read"]);

        let err = page
            .handle_submit(&SubmitRequest::new(&data, &caps, &Deny), &store, &notices)
            .unwrap_err();
        assert!(matches!(err, SubmitError::Forbidden { .. }));
        assert_eq!(
            err.user_message(),
            "You don't have the right permissions to update these settings."
        );
        assert_eq!(store.get("smtp_host").unwrap(), None);
    }

    #[test]
    fn invalid_token_writes_nothing() {
        let page = smtp_page().create(&mut MenuRegistry::new()).unwrap();
        let store = OptionStore::in_memory();
        let notices = Notices::new();
        let data = payload(&[("smtp_host", "mx"), (TOKEN_FIELD, "forged")]);
        let caps = Capabilities::all();

        let err = page
            .handle_submit(&SubmitRequest::new(&data, &caps, &Deny), &store, &notices)
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidToken { ref scope } if scope == "nw-smtp-settings"));
        assert_eq!(
            err.user_message(),
            "Invalid nonce value, please refresh the page and try again."
        );
        assert_eq!(store.get("smtp_host").unwrap(), None);
        assert!(notices.is_empty());
    }

    #[test]
    fn valid_submit_writes_in_order() {
        let page = smtp_page().create(&mut MenuRegistry::new()).unwrap();
        let store = OptionStore::in_memory();
        store.set("smtp_password", "kept").unwrap();
        let notices = Notices::new();
        let tokens = CsrfTokens::default();
        let token = tokens.issue(page.menu_slug());
        let data = payload(&[
            ("smtp_host", "mail.example.com"),
            ("smtp_password", ""),
            (TOKEN_FIELD, token.as_str()),
        ]);
        let caps = Capabilities::from_list(&[MANAGE_OPTIONS]);

        let outcome = page
            .handle_submit(&SubmitRequest::new(&data, &caps, &tokens), &store, &notices)
            .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Saved {
                written: vec!["smtp_enable".to_string(), "smtp_host".to_string()],
                unchanged: vec!["smtp_password".to_string()],
            }
        );
        assert_eq!(store.get("smtp_host").unwrap().as_deref(), Some("mail.example.com"));
        assert_eq!(store.get("smtp_password").unwrap().as_deref(), Some("kept"));
        assert_eq!(store.get("smtp_enable").unwrap().as_deref(), Some(""));

        let queued = notices.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].level, NoticeLevel::Success);
        assert_eq!(queued[0].message, SAVED_MESSAGE);
    }

    #[test]
    fn checkbox_absent_with_unchanged_policy_keeps_value() {
        let page = SettingsPage::new(BuilderConfig::default())
            .section(
                SettingsSection::new("smtp", "SMTP").field(
                    InputField::checkbox("enable", "Enable").when_absent(CheckboxAbsence::Unchanged),
                ),
            )
            .create(&mut MenuRegistry::new())
            .unwrap();
        let store = OptionStore::in_memory();
        store.set("smtp_enable", "1").unwrap();
        let tokens = CsrfTokens::default();
        let token = tokens.issue(page.menu_slug());
        let data = payload(&[(TOKEN_FIELD, token.as_str())]);
        let caps = Capabilities::all();

        page.handle_submit(&SubmitRequest::new(&data, &caps, &tokens), &store, &Notices::new())
            .unwrap();
        assert_eq!(store.get("smtp_enable").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn render_shows_sections_values_and_notices() {
        let page = SettingsPage::new(BuilderConfig::default())
            .page_title("SMTP settings")
            .section(
                SettingsSection::new("smtp", "SMTP values")
                    .subtitle("Outgoing mail")
                    .field(InputField::text("host", "Host").description("Mail server"))
                    .field(InputField::password("password", "Password")),
            )
            .create(&mut MenuRegistry::new())
            .unwrap();
        let store = OptionStore::in_memory();
        store.set("smtp_host", "mail.example.com").unwrap();
        store.set("smtp_password", "s3cr3t").unwrap();
        let tokens = CsrfTokens::default();
        let notices = Notices::new();
        notices.push(Notice::success(SAVED_MESSAGE));

        let html = page.render(&store, &tokens, &notices).unwrap();
        assert!(html.contains("<h1>SMTP settings</h1>"));
        assert!(html.contains("<h2>SMTP values</h2>"));
        assert!(html.contains("<p>Outgoing mail</p>"));
        assert!(html.contains(r#"value="mail.example.com""#));
        assert!(html.contains("Mail server"));
        assert!(!html.contains("s3cr3t"));
        assert!(html.contains("notice-success"));
        assert!(html.contains(SAVED_MESSAGE));
        assert!(html.contains(r#"name="_token""#));
        assert!(html.contains(SUBMIT_LABEL));
        assert_eq!(tokens.pending(page.menu_slug()), 1);
        assert!(notices.is_empty());
    }
}
