//! Host records and their per-record meta values.

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A host content item a metabox can attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    /// Record type, e.g. `page` or `nw_sent_email`.
    pub record_type: String,
    /// Page template assigned to the record, if any.
    #[serde(default)]
    pub template: Option<String>,
}

impl Record {
    /// Create a record without a template.
    pub fn new(id: u64, record_type: impl Into<String>) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            template: None,
        }
    }

    /// Set the page template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }
}

/// Per-record key to string storage owned by the host.
pub trait MetaStore: Send + Sync {
    /// Get a meta value.
    fn get_meta(&self, record_id: u64, key: &str) -> Result<Option<String>>;

    /// Set a meta value, replacing any previous one.
    fn set_meta(&self, record_id: u64, key: &str, value: &str) -> Result<()>;
}

/// In-memory meta storage.
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    values: RwLock<HashMap<u64, BTreeMap<String, String>>>,
}

impl MemoryMetaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All meta values of one record, sorted by key.
    pub fn all_for(&self, record_id: u64) -> BTreeMap<String, String> {
        self.values
            .read()
            .get(&record_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl MetaStore for MemoryMetaStore {
    fn get_meta(&self, record_id: u64, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .get(&record_id)
            .and_then(|meta| meta.get(key))
            .cloned())
    }

    fn set_meta(&self, record_id: u64, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .entry(record_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn meta_is_scoped_per_record() {
        let store = MemoryMetaStore::new();
        store.set_meta(1, "nw-subtitle", "one").unwrap();
        store.set_meta(2, "nw-subtitle", "two").unwrap();
        store.set_meta(1, "nw-subtitle", "uno").unwrap();

        assert_eq!(store.get_meta(1, "nw-subtitle").unwrap().as_deref(), Some("uno"));
        assert_eq!(store.get_meta(2, "nw-subtitle").unwrap().as_deref(), Some("two"));
        assert_eq!(store.get_meta(3, "nw-subtitle").unwrap(), None);
        assert_eq!(store.all_for(1).len(), 1);
        assert!(store.all_for(3).is_empty());
    }

    #[test]
    fn record_builder() {
        let record = Record::new(7, "page").with_template("landing.php");
        assert_eq!(record.template.as_deref(), Some("landing.php"));

        let json = serde_json::to_string(&Record::new(1, "post")).unwrap();
        let parsed: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.template, None);
    }
}
