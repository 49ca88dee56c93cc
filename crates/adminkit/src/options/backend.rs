//! Raw option storage backends.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tempfile::NamedTempFile;
use tracing::debug;

/// Raw key to string storage, with no interception applied.
///
/// Last write wins; there are no transactions.
pub trait OptionBackend: Send + Sync {
    /// Read the stored value for a key.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Get all stored options.
    fn all(&self) -> Result<BTreeMap<String, String>>;
}

/// In-process option table.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Option table persisted as a pretty-printed JSON object.
///
/// Every call reads the file, so several backends over one path see each
/// other's writes. Changes are applied to a fresh read and land through a
/// temporary file renamed over the original, so a crash never leaves a
/// truncated file behind.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Open the file at `path`, starting empty when it does not exist.
    ///
    /// An existing file is parsed up front so a corrupt file is reported here.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = load(&path)?;
        debug!(path = %path.display(), count = values.len(), "loaded options file");

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to the current file contents and write them back.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>) -> bool) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut values = load(&self.path)?;
        if change(&mut values) {
            self.flush(&values)?;
        }
        Ok(())
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(values).context("failed to serialize options")?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("failed to write temporary options file")?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed to write options file {}", self.path.display()))?;
        Ok(())
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read options file {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse options file {}", path.display()))
}

impl OptionBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(load(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.update(|values| values.remove(key).is_some())
    }

    fn all(&self) -> Result<BTreeMap<String, String>> {
        load(&self.path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_last_write_wins() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get("a").unwrap(), None);

        backend.set("a", "1").unwrap();
        backend.set("a", "2").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("2"));

        backend.delete("a").unwrap();
        backend.delete("a").unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
    }

    #[test]
    fn json_file_backend_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");

        {
            let backend = JsonFileBackend::open(&path).unwrap();
            backend.set("smtp_host", "mail.example.com").unwrap();
            backend.set("smtp_port", "587").unwrap();
            backend.delete("smtp_port").unwrap();
        }

        let reopened = JsonFileBackend::open(&path).unwrap();
        assert_eq!(
            reopened.get("smtp_host").unwrap().as_deref(),
            Some("mail.example.com")
        );
        assert_eq!(reopened.get("smtp_port").unwrap(), None);
        assert_eq!(reopened.all().unwrap().len(), 1);
    }

    #[test]
    fn json_file_backends_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");

        let a = JsonFileBackend::open(&path).unwrap();
        let b = JsonFileBackend::open(&path).unwrap();
        a.set("smtp_host", "mail.example.com").unwrap();
        b.set("smtp_port", "587").unwrap();

        assert_eq!(b.get("smtp_host").unwrap().as_deref(), Some("mail.example.com"));
        let all = JsonFileBackend::open(&path).unwrap().all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("smtp_port").map(String::as_str), Some("587"));

        // Last write wins per key.
        a.set("smtp_port", "25").unwrap();
        assert_eq!(b.get("smtp_port").unwrap().as_deref(), Some("25"));
    }

    #[test]
    fn json_file_backend_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");

        let backend = JsonFileBackend::open(&path).unwrap();
        backend.set("a", "1").unwrap();
        backend.set("b", "2").unwrap();
        backend.delete("a").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("options.json")]);
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn json_file_backend_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "not json").unwrap();

        let err = JsonFileBackend::open(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse options file"));
    }

    #[test]
    fn json_file_backend_accepts_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "").unwrap();

        let backend = JsonFileBackend::open(&path).unwrap();
        assert!(backend.all().unwrap().is_empty());
    }
}
