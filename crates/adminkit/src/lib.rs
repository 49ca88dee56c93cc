//! adminkit library
//!
//! Declarative builders for admin settings pages and per-record metaboxes,
//! backed by an option store that applies registered read/write interceptors
//! (encrypted secrets, one-shot action triggers).
//!
//! The host platform owns the request lifecycle. It calls
//! [`settings::RegisteredPage::handle_submit`] and then
//! [`settings::RegisteredPage::render`] for every dispatch of a page.

pub mod config;
pub mod crypto;
pub mod error;
pub mod form;
pub mod helpers;
pub mod host;
pub mod mail;
pub mod metabox;
pub mod options;
pub mod permissions;
pub mod settings;
pub mod theme;

pub use config::{BuilderConfig, Config};
pub use crypto::{CryptoError, SecretCipher};
pub use error::{AppError, AppResult};
pub use options::{OptionStore, SecureOptionBinding, TriggerBinding};
pub use settings::{RegisteredPage, SettingsPage, SettingsSection};
