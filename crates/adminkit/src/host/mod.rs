//! Interfaces to the host platform.
//!
//! The host owns menus, the request lifecycle and the admin notice area.
//! adminkit only talks to it through these types.

mod menu;
mod notice;

use std::collections::HashMap;

pub use menu::{MenuEntry, MenuRegistrar, MenuRegistry};
pub use notice::{Notice, NoticeLevel, NoticeQueue, Notices};

use crate::form::CsrfVerifier;
use crate::permissions::Capabilities;

/// One form submission dispatched by the host.
pub struct SubmitRequest<'a> {
    /// Submitted form fields.
    pub payload: &'a HashMap<String, String>,

    /// What the current actor is allowed to do.
    pub capabilities: &'a Capabilities,

    /// Token checker for the current session.
    pub csrf: &'a dyn CsrfVerifier,
}

impl<'a> SubmitRequest<'a> {
    /// Bundle the parts of a submission.
    pub fn new(
        payload: &'a HashMap<String, String>,
        capabilities: &'a Capabilities,
        csrf: &'a dyn CsrfVerifier,
    ) -> Self {
        Self {
            payload,
            capabilities,
            csrf,
        }
    }
}

impl std::fmt::Debug for SubmitRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Payload values may hold secrets; only list the keys.
        let mut keys: Vec<&String> = self.payload.keys().collect();
        keys.sort();
        f.debug_struct("SubmitRequest")
            .field("payload_keys", &keys)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
