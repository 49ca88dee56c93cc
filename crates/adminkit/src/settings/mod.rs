//! Declarative admin settings pages.
//!
//! A [`SettingsPage`] is configured with sections of typed fields, validated
//! and registered with the host through [`SettingsPage::create`]. The
//! resulting [`RegisteredPage`] handles submissions and renders the form.

mod page;
mod section;

pub use page::{
    DEFAULT_ICON, DEFAULT_PAGE_TITLE, PageError, RegisteredPage, RenderError, SAVED_MESSAGE,
    SUBMIT_LABEL, SettingsPage, SubmitError, SubmitOutcome,
};
pub use section::SettingsSection;
