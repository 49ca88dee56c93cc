//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::crypto::SecretCipher;

/// Prefix used when `ADMINKIT_PREFIX` is not set.
pub const DEFAULT_PREFIX: &str = "nw";

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    /// Prefix for page slugs, metabox ids and record types (default: "nw").
    pub prefix: String,

    /// Key for encrypting secret options. Either 64 hex characters (raw
    /// 256-bit key) or an arbitrary passphrase that is run through HKDF.
    pub encryption_key: Option<String>,

    /// Path of the JSON options file used by the CLI (default: ./options.json).
    pub options_file: PathBuf,

    /// Lifetime of issued form tokens in seconds (default: 3600).
    pub csrf_ttl_secs: i64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("prefix", &self.prefix)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "<redacted>"))
            .field("options_file", &self.options_file)
            .field("csrf_ttl_secs", &self.csrf_ttl_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let prefix = lookup("ADMINKIT_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        validate_prefix(&prefix)?;

        let encryption_key = lookup("ADMINKIT_ENCRYPTION_KEY").filter(|k| !k.is_empty());

        let options_file = lookup("ADMINKIT_OPTIONS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./options.json"));

        let csrf_ttl_secs = lookup("ADMINKIT_CSRF_TTL_SECS")
            .unwrap_or_else(|| "3600".to_string())
            .parse()
            .context("ADMINKIT_CSRF_TTL_SECS must be a valid integer")?;

        Ok(Self {
            prefix,
            encryption_key,
            options_file,
            csrf_ttl_secs,
        })
    }

    /// Builder settings derived from this configuration.
    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            prefix: self.prefix.clone(),
        }
    }

    /// Cipher for secret options, if a key is configured.
    pub fn cipher(&self) -> Result<Option<SecretCipher>> {
        self.encryption_key
            .as_deref()
            .map(|key| SecretCipher::from_config_key(key).context("invalid ADMINKIT_ENCRYPTION_KEY"))
            .transpose()
    }
}

/// Settings handed to every builder at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Namespace for host-visible identifiers.
    pub prefix: String,
}

impl BuilderConfig {
    /// Create builder settings with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Join the prefix and a name with the given separator.
    pub fn prefixed(&self, separator: char, name: &str) -> String {
        format!("{}{separator}{name}", self.prefix)
    }
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        bail!("ADMINKIT_PREFIX must not be empty");
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("ADMINKIT_PREFIX may only contain ASCII letters, digits and underscores");
    }
    Ok(())
}
