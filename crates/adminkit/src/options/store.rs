//! Interceptor-aware option store.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::backend::{MemoryBackend, OptionBackend};
use super::interceptor::{InterceptorRegistry, OptionInterceptor, WriteContext};

/// Errors from reading or writing options.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("option backend failed for '{key}'")]
    Backend {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("interceptor '{interceptor}' rejected write to '{key}'")]
    Intercept {
        key: String,
        interceptor: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Option store applying registered interceptors on every read and write.
pub struct OptionStore {
    backend: Arc<dyn OptionBackend>,
    interceptors: InterceptorRegistry,
}

impl std::fmt::Debug for OptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionStore")
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

impl OptionStore {
    /// Create a store over a backend.
    pub fn new(backend: impl OptionBackend + 'static) -> Self {
        Self::with_backend(Arc::new(backend))
    }

    /// Create a store over a shared backend.
    pub fn with_backend(backend: Arc<dyn OptionBackend>) -> Self {
        Self {
            backend,
            interceptors: InterceptorRegistry::new(),
        }
    }

    /// Create a store over a fresh in-memory table.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Attach an interceptor to a key.
    pub fn intercept(&mut self, key: impl Into<String>, interceptor: OptionInterceptor) -> &mut Self {
        self.interceptors.register(key, interceptor);
        self
    }

    /// The interceptor registry, for inspection.
    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    /// The underlying backend.
    pub fn backend(&self) -> &Arc<dyn OptionBackend> {
        &self.backend
    }

    /// Read an option with its read hooks applied.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let raw = self.get_raw(key)?;
        Ok(raw.map(|value| self.interceptors.apply_read(key, &value)))
    }

    /// Read an option, treating unset as the empty string.
    pub fn get_or_empty(&self, key: &str) -> Result<String, StoreError> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Read the stored form of an option, bypassing read hooks.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.get(key).map_err(|source| StoreError::Backend {
            key: key.to_string(),
            source,
        })
    }

    /// Write an option with its write hooks applied.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let stored = if self.interceptors.has_interceptors(key) {
            let old = self.get_raw(key)?;
            let context = WriteContext::new(key, old.as_deref(), self);
            self.interceptors.apply_write(&context, value)?
        } else {
            value.to_string()
        };

        self.backend
            .set(key, &stored)
            .map_err(|source| StoreError::Backend {
                key: key.to_string(),
                source,
            })?;

        debug!(key = %key, intercepted = self.interceptors.has_interceptors(key), "option stored");
        Ok(())
    }

    /// Remove an option.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.backend.delete(key).map_err(|source| StoreError::Backend {
            key: key.to_string(),
            source,
        })
    }

    /// Whether an option is set to a truthy value.
    pub fn is_truthy(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some_and(|v| super::is_truthy(&v)))
    }
}
