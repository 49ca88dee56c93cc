//! Capability checking with DashMap-based caching.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability required by settings pages unless configured otherwise.
pub const MANAGE_OPTIONS: &str = "manage_options";

/// Built-in role names.
pub mod well_known {
    pub const ADMINISTRATOR: &str = "administrator";
    pub const EDITOR: &str = "editor";
    pub const SUBSCRIBER: &str = "subscriber";
}

/// The user performing a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub login: String,
    pub roles: Vec<String>,
    /// Super users hold every capability.
    #[serde(default)]
    pub is_admin: bool,
}

impl Actor {
    /// Create an actor with the given roles.
    pub fn new(login: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            id: Uuid::now_v7(),
            login: login.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            is_admin: false,
        }
    }

    /// Create a super user.
    pub fn super_admin(login: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(login, &[well_known::ADMINISTRATOR])
        }
    }

    /// Create a visitor with no roles.
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::nil(),
            login: String::new(),
            roles: Vec::new(),
            is_admin: false,
        }
    }

    /// Check if this is the anonymous actor.
    pub fn is_anonymous(&self) -> bool {
        self.id.is_nil()
    }
}

/// Resolved capabilities of one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    all: bool,
    granted: HashSet<String>,
}

impl Capabilities {
    /// Capabilities from an explicit list.
    pub fn from_list(capabilities: &[&str]) -> Self {
        Self {
            all: false,
            granted: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Every capability.
    pub fn all() -> Self {
        Self {
            all: true,
            granted: HashSet::new(),
        }
    }

    /// No capabilities.
    pub fn none() -> Self {
        Self::default()
    }

    /// Check a capability.
    pub fn can(&self, capability: &str) -> bool {
        self.all || self.granted.contains(capability)
    }
}

/// Capability service with fast DashMap-based lookups.
#[derive(Clone)]
pub struct CapabilityService {
    inner: Arc<CapabilityServiceInner>,
}

struct CapabilityServiceInner {
    /// Role name -> capabilities.
    roles: RwLock<HashMap<String, HashSet<String>>>,

    /// Cache of actor id -> resolved capabilities.
    actor_cache: DashMap<Uuid, Capabilities>,
}

impl std::fmt::Debug for CapabilityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityService")
            .field("roles", &self.inner.roles.read().len())
            .field("cached", &self.inner.actor_cache.len())
            .finish()
    }
}

impl Default for CapabilityService {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityService {
    /// Create a service with no roles defined.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CapabilityServiceInner {
                roles: RwLock::new(HashMap::new()),
                actor_cache: DashMap::new(),
            }),
        }
    }

    /// Create a service with the built-in roles.
    pub fn with_default_roles() -> Self {
        let service = Self::new();
        service.define_role(
            well_known::ADMINISTRATOR,
            &[MANAGE_OPTIONS, "edit_posts", "edit_others_posts", "read"],
        );
        service.define_role(
            well_known::EDITOR,
            &["edit_posts", "edit_others_posts", "read"],
        );
        service.define_role(well_known::SUBSCRIBER, &["read"]);
        service
    }

    /// Define or replace a role.
    pub fn define_role(&self, role: &str, capabilities: &[&str]) {
        self.inner.roles.write().insert(
            role.to_string(),
            capabilities.iter().map(|c| c.to_string()).collect(),
        );
        self.invalidate_all();
    }

    /// Resolve an actor's capabilities.
    ///
    /// - Super users hold every capability.
    /// - Anonymous actors hold none.
    /// - Everyone else holds the union of their roles' capabilities.
    pub fn capabilities_for(&self, actor: &Actor) -> Capabilities {
        if actor.is_admin {
            return Capabilities::all();
        }
        if actor.is_anonymous() {
            return Capabilities::none();
        }

        if let Some(cached) = self.inner.actor_cache.get(&actor.id) {
            return cached.clone();
        }

        // Cache while the role table is locked so `define_role` cannot
        // invalidate between the read and the insert.
        let roles = self.inner.roles.read();
        let granted: HashSet<String> = actor
            .roles
            .iter()
            .filter_map(|role| roles.get(role))
            .flat_map(|caps| caps.iter().cloned())
            .collect();
        let capabilities = Capabilities {
            all: false,
            granted,
        };
        self.inner
            .actor_cache
            .insert(actor.id, capabilities.clone());
        drop(roles);
        capabilities
    }

    /// Check if an actor has a capability.
    pub fn actor_can(&self, actor: &Actor, capability: &str) -> bool {
        self.capabilities_for(actor).can(capability)
    }

    /// Invalidate the cache for one actor.
    ///
    /// Call this when an actor's roles change.
    pub fn invalidate_actor(&self, actor_id: Uuid) {
        self.inner.actor_cache.remove(&actor_id);
    }

    /// Invalidate the entire cache.
    pub fn invalidate_all(&self) {
        self.inner.actor_cache.clear();
    }

    /// Get the number of cached entries (for monitoring).
    pub fn cache_size(&self) -> usize {
        self.inner.actor_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrators_manage_options() {
        let service = CapabilityService::with_default_roles();
        let admin = Actor::new("alice", &[well_known::ADMINISTRATOR]);
        let editor = Actor::new("bob", &[well_known::EDITOR]);

        assert!(service.actor_can(&admin, MANAGE_OPTIONS));
        assert!(!service.actor_can(&editor, MANAGE_OPTIONS));
        assert!(service.actor_can(&editor, "edit_posts"));
    }

    #[test]
    fn super_admin_holds_everything() {
        let service = CapabilityService::new();
        let root = Actor::super_admin("root");
        assert!(service.actor_can(&root, "anything_at_all"));
        assert_eq!(service.cache_size(), 0);
    }

    #[test]
    fn anonymous_holds_nothing() {
        let service = CapabilityService::with_default_roles();
        let anon = Actor::anonymous();
        assert!(anon.is_anonymous());
        assert!(!service.actor_can(&anon, "read"));
    }

    #[test]
    fn roles_union() {
        let service = CapabilityService::new();
        service.define_role("mailer", &["send_mail"]);
        service.define_role("reader", &["read"]);
        let actor = Actor::new("carol", &["mailer", "reader", "unknown"]);

        let caps = service.capabilities_for(&actor);
        assert!(caps.can("send_mail"));
        assert!(caps.can("read"));
        assert!(!caps.can(MANAGE_OPTIONS));
    }

    #[test]
    fn cache_invalidation() {
        let service = CapabilityService::new();
        service.define_role("mailer", &["send_mail"]);
        let actor = Actor::new("dave", &["mailer"]);

        assert!(service.actor_can(&actor, "send_mail"));
        assert_eq!(service.cache_size(), 1);

        service.invalidate_actor(actor.id);
        assert_eq!(service.cache_size(), 0);

        service.actor_can(&actor, "send_mail");
        service.define_role("mailer", &[]);
        assert_eq!(service.cache_size(), 0);
        assert!(!service.actor_can(&actor, "send_mail"));
    }

    #[test]
    fn role_changes_during_lookups_are_not_cached_stale() {
        let service = CapabilityService::new();
        service.define_role("mailer", &["send_mail"]);
        let actor = Actor::new("erin", &["mailer"]);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..200 {
                    service.capabilities_for(&actor);
                }
            });
            scope.spawn(|| {
                for i in 0..200 {
                    let caps: &[&str] = if i % 2 == 0 { &[] } else { &["send_mail"] };
                    service.define_role("mailer", caps);
                }
                service.define_role("mailer", &[]);
            });
        });

        assert!(!service.actor_can(&actor, "send_mail"));
    }

    #[test]
    fn explicit_capability_lists() {
        let caps = Capabilities::from_list(&[MANAGE_OPTIONS]);
        assert!(caps.can(MANAGE_OPTIONS));
        assert!(!caps.can("edit_posts"));
        assert!(Capabilities::all().can("edit_posts"));
        assert!(!Capabilities::none().can("read"));
    }
}
