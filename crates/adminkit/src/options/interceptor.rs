//! Interceptor registry - maps option keys to ordered read/write transforms.
//!
//! Write hooks run in weight order (lower = first). Read hooks run in reverse
//! weight order, so a key with several interceptors unwraps its value in the
//! opposite order it was wrapped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::store::{OptionStore, StoreError};

/// Transform applied to a value before it is stored.
pub type WriteHook =
    Arc<dyn Fn(&WriteContext<'_>, &str) -> anyhow::Result<String> + Send + Sync>;

/// Transform applied to a stored value before it reaches a caller.
pub type ReadHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// What a write hook can see about the write in progress.
pub struct WriteContext<'a> {
    key: &'a str,
    old_value: Option<&'a str>,
    store: &'a OptionStore,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(key: &'a str, old_value: Option<&'a str>, store: &'a OptionStore) -> Self {
        Self {
            key,
            old_value,
            store,
        }
    }

    /// The option key being written.
    pub fn key(&self) -> &str {
        self.key
    }

    /// The raw stored value before this write, if any.
    pub fn old_value(&self) -> Option<&str> {
        self.old_value
    }

    /// Read another option through the store, with its read hooks applied.
    ///
    /// Backend failures are logged and read as unset.
    pub fn option(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to read option inside write hook");
                None
            }
        }
    }
}

/// A named pair of optional transforms attached to one option key.
#[derive(Clone)]
pub struct OptionInterceptor {
    name: String,
    weight: i32,
    on_write: Option<WriteHook>,
    on_read: Option<ReadHook>,
}

impl std::fmt::Debug for OptionInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionInterceptor")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("on_write", &self.on_write.is_some())
            .field("on_read", &self.on_read.is_some())
            .finish()
    }
}

impl OptionInterceptor {
    /// Create an interceptor with no hooks and weight 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 0,
            on_write: None,
            on_read: None,
        }
    }

    /// Set the ordering weight (lower = applied first on write).
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the write transform.
    pub fn on_write<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WriteContext<'_>, &str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.on_write = Some(Arc::new(hook));
        self
    }

    /// Set the read transform.
    pub fn on_read<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.on_read = Some(Arc::new(hook));
        self
    }

    /// Interceptor name, for inspection and logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordering weight.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Whether a write transform is set.
    pub fn intercepts_writes(&self) -> bool {
        self.on_write.is_some()
    }

    /// Whether a read transform is set.
    pub fn intercepts_reads(&self) -> bool {
        self.on_read.is_some()
    }
}

/// Registry mapping option keys to ordered interceptors.
#[derive(Debug, Default)]
pub struct InterceptorRegistry {
    interceptors: HashMap<String, Vec<OptionInterceptor>>,
}

impl InterceptorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an interceptor to a key.
    ///
    /// Interceptors with equal weight keep registration order.
    pub fn register(&mut self, key: impl Into<String>, interceptor: OptionInterceptor) {
        let key = key.into();
        debug!(key = %key, interceptor = %interceptor.name, weight = interceptor.weight, "registered option interceptor");

        let list = self.interceptors.entry(key).or_default();
        list.push(interceptor);
        list.sort_by_key(|i| i.weight);
    }

    /// Interceptors for a key, in weight order.
    ///
    /// Returns an empty slice if nothing intercepts the key.
    pub fn get_interceptors(&self, key: &str) -> &[OptionInterceptor] {
        self.interceptors
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Check if any interceptor is attached to a key.
    pub fn has_interceptors(&self, key: &str) -> bool {
        self.interceptors
            .get(key)
            .is_some_and(|list| !list.is_empty())
    }

    /// Names of the interceptors attached to a key, in weight order.
    pub fn interceptor_names(&self, key: &str) -> Vec<&str> {
        self.get_interceptors(key)
            .iter()
            .map(|i| i.name.as_str())
            .collect()
    }

    /// All intercepted keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.interceptors.keys().map(|s| s.as_str())
    }

    /// Number of intercepted keys.
    pub fn key_count(&self) -> usize {
        self.interceptors.len()
    }

    /// Run the write hooks for a key over an incoming value.
    pub(crate) fn apply_write(
        &self,
        context: &WriteContext<'_>,
        value: &str,
    ) -> Result<String, StoreError> {
        let mut current = value.to_string();
        for interceptor in self.get_interceptors(context.key()) {
            let Some(hook) = &interceptor.on_write else {
                continue;
            };
            current = hook(context, &current).map_err(|source| StoreError::Intercept {
                key: context.key().to_string(),
                interceptor: interceptor.name.clone(),
                source,
            })?;
        }
        Ok(current)
    }

    /// Run the read hooks for a key over a stored value.
    pub(crate) fn apply_read(&self, key: &str, value: &str) -> String {
        let mut current = value.to_string();
        for interceptor in self.get_interceptors(key).iter().rev() {
            if let Some(hook) = &interceptor.on_read {
                current = hook(&current);
            }
        }
        current
    }
}
