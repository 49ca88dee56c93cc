//! CSRF token generation and verification.
//!
//! Tokens are bound to a scope (a page slug, a metabox id), single-use and
//! time-limited.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Form field carrying the CSRF token.
pub const TOKEN_FIELD: &str = "_token";

/// Maximum number of live tokens kept per scope.
const MAX_TOKENS: usize = 10;

/// Default token validity period in seconds (1 hour).
pub const DEFAULT_TOKEN_VALIDITY_SECS: i64 = 3600;

/// Issues tokens for a scope.
pub trait CsrfIssuer {
    /// Generate a token valid for `scope`.
    fn issue(&self, scope: &str) -> String;
}

/// Checks tokens for a scope.
pub trait CsrfVerifier {
    /// Whether `token` was issued for `scope` and is still valid.
    /// A successful check consumes the token.
    fn verify(&self, scope: &str, token: &str) -> bool;
}

#[derive(Debug, Clone)]
struct StoredToken {
    token: String,
    issued: i64,
}

/// Per-session token store.
#[derive(Debug)]
pub struct CsrfTokens {
    tokens: Mutex<HashMap<String, Vec<StoredToken>>>,
    validity_secs: i64,
}

impl Default for CsrfTokens {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_VALIDITY_SECS)
    }
}

impl CsrfTokens {
    /// Create an empty store with the given token lifetime.
    pub fn new(validity_secs: i64) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            validity_secs,
        }
    }

    /// Number of live tokens for a scope.
    pub fn pending(&self, scope: &str) -> usize {
        self.tokens.lock().get(scope).map(Vec::len).unwrap_or(0)
    }

    /// Clear all tokens.
    pub fn clear(&self) {
        self.tokens.lock().clear();
    }

    fn issue_at(&self, scope: &str, now: i64) -> String {
        let mut random_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        let mut hasher = Sha256::new();
        hasher.update(random_bytes);
        hasher.update(now.to_le_bytes());
        hasher.update(scope.as_bytes());
        let token = hex::encode(hasher.finalize());

        let mut tokens = self.tokens.lock();
        let list = tokens.entry(scope.to_string()).or_default();
        list.push(StoredToken {
            token: token.clone(),
            issued: now,
        });

        // Keep only the most recent tokens
        if list.len() > MAX_TOKENS {
            let skip = list.len() - MAX_TOKENS;
            list.drain(..skip);
        }

        token
    }

    fn verify_at(&self, scope: &str, submitted: &str, now: i64) -> bool {
        if submitted.is_empty() {
            return false;
        }

        let mut tokens = self.tokens.lock();
        let Some(list) = tokens.get_mut(scope) else {
            debug!(scope = %scope, "no tokens issued for scope");
            return false;
        };

        let found = list.iter().position(|stored| {
            let matches: bool = stored.token.as_bytes().ct_eq(submitted.as_bytes()).into();
            matches && now - stored.issued <= self.validity_secs
        });

        // Drop expired tokens while we're at it
        let validity = self.validity_secs;
        if let Some(index) = found {
            list.remove(index);
        }
        list.retain(|stored| now - stored.issued <= validity);

        found.is_some()
    }
}

impl CsrfIssuer for CsrfTokens {
    fn issue(&self, scope: &str) -> String {
        self.issue_at(scope, chrono::Utc::now().timestamp())
    }
}

impl CsrfVerifier for CsrfTokens {
    fn verify(&self, scope: &str, token: &str) -> bool {
        self.verify_at(scope, token, chrono::Utc::now().timestamp())
    }
}
