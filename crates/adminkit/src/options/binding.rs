//! Bindings that give individual option keys special storage behavior.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use super::interceptor::{OptionInterceptor, WriteContext};
use super::store::OptionStore;
use super::{FALSE_VALUE, is_truthy};
use crate::crypto::SecretCipher;

/// Keeps an option encrypted at rest.
///
/// Writes are replaced by their ciphertext before storage; reads are
/// decrypted before reaching any caller. An empty write stays empty so an
/// unset secret reads back as unset.
#[derive(Debug, Clone)]
pub struct SecureOptionBinding {
    key: String,
    cipher: SecretCipher,
}

impl SecureOptionBinding {
    /// Interceptor name used in the registry.
    pub const NAME: &'static str = "secure-option";

    /// Bind a key to a cipher.
    pub fn new(key: impl Into<String>, cipher: SecretCipher) -> Self {
        Self {
            key: key.into(),
            cipher,
        }
    }

    /// The bound option key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Register the encrypt/decrypt interceptor on the store.
    pub fn install(self, store: &mut OptionStore) {
        let write_cipher = self.cipher.clone();
        let read_cipher = self.cipher;

        let interceptor = OptionInterceptor::new(Self::NAME)
            .on_write(move |ctx: &WriteContext<'_>, value: &str| {
                if value.is_empty() {
                    return Ok(String::new());
                }
                write_cipher
                    .encrypt(value)
                    .with_context(|| format!("failed to encrypt option '{}'", ctx.key()))
            })
            .on_read(move |stored: &str| read_cipher.decrypt(stored));

        store.intercept(self.key, interceptor);
    }
}

/// Action run when a trigger option receives a truthy value.
pub type TriggerAction = Arc<dyn Fn(&WriteContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Turns an option into a one-shot action button.
///
/// A truthy write runs the action; whatever was submitted, the stored value
/// is always reset to the falsy sentinel.
#[derive(Clone)]
pub struct TriggerBinding {
    key: String,
    action: TriggerAction,
}

impl std::fmt::Debug for TriggerBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerBinding")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl TriggerBinding {
    /// Interceptor name used in the registry.
    pub const NAME: &'static str = "trigger";

    /// Bind an action to a key.
    pub fn new<F>(key: impl Into<String>, action: F) -> Self
    where
        F: Fn(&WriteContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            action: Arc::new(action),
        }
    }

    /// The bound option key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Register the trigger interceptor on the store.
    pub fn install(self, store: &mut OptionStore) {
        let action = self.action;

        let interceptor = OptionInterceptor::new(Self::NAME).on_write(
            move |ctx: &WriteContext<'_>, value: &str| {
                if is_truthy(value) {
                    info!(key = %ctx.key(), "trigger option fired");
                    if let Err(e) = action(ctx) {
                        warn!(key = %ctx.key(), error = %e, "trigger action failed");
                    }
                }
                Ok(FALSE_VALUE.to_string())
            },
        );

        store.intercept(self.key, interceptor);
    }
}
