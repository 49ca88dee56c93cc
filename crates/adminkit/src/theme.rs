//! Built-in Tera templates for settings pages and metaboxes.

use std::sync::LazyLock;

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::debug;

/// Template for a full settings page.
pub const SETTINGS_PAGE: &str = "settings/page.html";

/// Template for the fields of one metabox.
pub const METABOX_FIELDS: &str = "metabox/fields.html";

static ENGINE: LazyLock<Result<Tera, String>> = LazyLock::new(|| {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        (
            SETTINGS_PAGE,
            include_str!("../templates/settings/page.html"),
        ),
        (
            METABOX_FIELDS,
            include_str!("../templates/metabox/fields.html"),
        ),
    ])
    .map_err(|e| e.to_string())?;

    debug!(count = tera.get_template_names().count(), "loaded built-in templates");
    Ok(tera)
});

/// Errors from rendering a built-in template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("built-in templates failed to load: {0}")]
    Init(String),

    #[error("failed to render template")]
    Render(#[from] tera::Error),
}

/// Template view of one rendered field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldView {
    /// Input name, also used as the element id.
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    /// Pre-escaped control markup.
    pub control: String,
}

/// Render a built-in template.
pub fn render(template: &str, context: &Context) -> Result<String, TemplateError> {
    let tera = ENGINE.as_ref().map_err(|e| TemplateError::Init(e.clone()))?;
    Ok(tera.render(template, context)?)
}
