//! adminkit test utilities.
//!
//! Helpers for integration testing: an in-memory host, actors, submission
//! payloads, a recording mailer and assertion utilities.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use adminkit::form::{CsrfIssuer, CsrfTokens, TOKEN_FIELD};
use adminkit::host::{MenuRegistry, Notices, SubmitRequest};
use adminkit::mail::{Mailer, OutgoingMail, SiteIdentity, install_option_hooks};
use adminkit::permissions::{Actor, Capabilities, CapabilityService, well_known};
use adminkit::settings::{RegisteredPage, SubmitError, SubmitOutcome};
use adminkit::{OptionStore, SecretCipher};
use parking_lot::Mutex;

/// Cipher with a fixed test key.
pub fn test_cipher() -> SecretCipher {
    SecretCipher::from_bytes([42u8; 32])
}

/// Build a submission payload from pairs.
pub fn payload(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Create an administrator.
pub fn admin_user() -> Actor {
    Actor::new("admin", &[well_known::ADMINISTRATOR])
}

/// Create an editor, who may not manage options.
pub fn editor_user() -> Actor {
    Actor::new("editor", &[well_known::EDITOR])
}

/// Resolve an actor's capabilities against the built-in roles.
pub fn capabilities(actor: &Actor) -> Capabilities {
    CapabilityService::with_default_roles().capabilities_for(actor)
}

/// Site identity used for test mail headers.
pub fn test_site() -> SiteIdentity {
    SiteIdentity::new("Test Site", "admin@example.com")
}

/// Mailer that keeps every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    /// Create a mailer that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later sends fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }

    /// Number of messages accepted so far.
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mail transport unavailable");
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}

/// An in-memory host: option store, notices, form tokens and menu.
pub struct TestHost {
    pub store: OptionStore,
    pub notices: Arc<Notices>,
    pub csrf: CsrfTokens,
    pub menu: MenuRegistry,
    pub mailer: Arc<RecordingMailer>,
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost {
    /// Create a host with a plain in-memory store.
    pub fn new() -> Self {
        Self {
            store: OptionStore::in_memory(),
            notices: Arc::new(Notices::new()),
            csrf: CsrfTokens::default(),
            menu: MenuRegistry::new(),
            mailer: Arc::new(RecordingMailer::new()),
        }
    }

    /// Create a host whose store encrypts the SMTP password and sends test
    /// mail through [`TestHost::mailer`].
    pub fn with_smtp_hooks() -> Self {
        let mut host = Self::new();
        install_option_hooks(
            &mut host.store,
            test_cipher(),
            host.mailer.clone(),
            host.notices.clone(),
            test_site(),
        );
        host
    }

    /// Submit `pairs` to a page with a freshly issued, valid token.
    pub fn submit(
        &self,
        page: &RegisteredPage,
        actor: &Actor,
        pairs: &[(&str, &str)],
    ) -> Result<SubmitOutcome, SubmitError> {
        let token = self.csrf.issue(page.menu_slug());
        let mut data = payload(pairs);
        data.insert(TOKEN_FIELD.to_string(), token);
        self.submit_raw(page, actor, &data)
    }

    /// Submit a payload as is.
    pub fn submit_raw(
        &self,
        page: &RegisteredPage,
        actor: &Actor,
        data: &HashMap<String, String>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let caps = capabilities(actor);
        let request = SubmitRequest::new(data, &caps, &self.csrf);
        page.handle_submit(&request, &self.store, self.notices.as_ref())
    }

    /// Render a page, draining pending notices.
    pub fn render(&self, page: &RegisteredPage) -> String {
        match page.render(&self.store, &self.csrf, self.notices.as_ref()) {
            Ok(html) => html,
            Err(e) => panic!("failed to render '{}': {e}", page.menu_slug()),
        }
    }
}

/// Assertion helpers for rendered markup.
pub mod assert {
    /// Assert that a string contains a substring.
    pub fn contains(haystack: &str, needle: &str) {
        assert!(
            haystack.contains(needle),
            "Expected string to contain '{needle}'\nActual: {haystack}"
        );
    }

    /// Assert that a string does not contain a substring.
    pub fn not_contains(haystack: &str, needle: &str) {
        assert!(
            !haystack.contains(needle),
            "Expected string to NOT contain '{needle}'\nActual: {haystack}"
        );
    }
}
