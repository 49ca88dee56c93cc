//! Option storage with per-key read/write interception.
//!
//! The option store is a flat key to string table. Transforms are attached to
//! individual keys through an [`InterceptorRegistry`] owned by the store, so
//! callers never branch on whether a key is secret:
//! - [`SecureOptionBinding`] encrypts on write and decrypts on read
//! - [`TriggerBinding`] turns a key into a one-shot action

mod backend;
mod binding;
mod interceptor;
mod store;

pub use backend::{JsonFileBackend, MemoryBackend, OptionBackend};
pub use binding::{SecureOptionBinding, TriggerBinding};
pub use interceptor::{InterceptorRegistry, OptionInterceptor, ReadHook, WriteContext, WriteHook};
pub use store::{OptionStore, StoreError};

/// Value stored for a checked checkbox or an enabled flag.
pub const TRUE_VALUE: &str = "1";

/// Value stored for an unchecked checkbox or a reset trigger.
pub const FALSE_VALUE: &str = "";

/// Whether a submitted or stored value counts as "on".
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
