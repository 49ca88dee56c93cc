//! Admin menu registration.
//!
//! Builders hand a [`MenuEntry`] to the host through [`MenuRegistrar`].
//! [`MenuRegistry`] is the in-process registrar used by the CLI and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A menu page definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    /// Parent page slug; `None` for a top-level item.
    #[serde(default)]
    pub parent: Option<String>,
    /// Title shown in the browser and page heading.
    pub page_title: String,
    /// Title shown in the menu.
    pub menu_title: String,
    /// Capability required to open the page.
    pub capability: String,
    /// Unique page slug.
    pub slug: String,
    /// Menu icon (top-level items only).
    #[serde(default)]
    pub icon: Option<String>,
    /// Menu position (top-level items only).
    #[serde(default)]
    pub position: Option<i32>,
}

/// Something that accepts admin page registrations.
pub trait MenuRegistrar {
    /// Register a page.
    fn register_page(&mut self, entry: MenuEntry);
}

/// Registry of admin pages.
///
/// The first registration of a slug wins; later ones are logged and dropped.
#[derive(Debug, Default)]
pub struct MenuRegistry {
    /// All entries, indexed by slug.
    entries: HashMap<String, MenuEntry>,
    /// Child slugs by parent slug, in registration order.
    children: HashMap<String, Vec<String>>,
    /// Registration order of top-level slugs.
    top_level: Vec<String>,
}

impl MenuRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entry by slug.
    pub fn get(&self, slug: &str) -> Option<&MenuEntry> {
        self.entries.get(slug)
    }

    /// Whether a slug is registered.
    pub fn contains(&self, slug: &str) -> bool {
        self.entries.contains_key(slug)
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pages are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sub-pages of a parent slug, in registration order.
    pub fn children(&self, parent: &str) -> Vec<&MenuEntry> {
        self.children
            .get(parent)
            .map(|slugs| slugs.iter().filter_map(|s| self.entries.get(s)).collect())
            .unwrap_or_default()
    }

    /// Top-level pages sorted by position; unpositioned pages go last.
    pub fn top_level(&self) -> Vec<&MenuEntry> {
        let mut items: Vec<&MenuEntry> = self
            .top_level
            .iter()
            .filter_map(|s| self.entries.get(s))
            .collect();
        items.sort_by_key(|e| (e.position.is_none(), e.position.unwrap_or(0)));
        items
    }
}

impl MenuRegistrar for MenuRegistry {
    fn register_page(&mut self, entry: MenuEntry) {
        if self.entries.contains_key(&entry.slug) {
            warn!(slug = %entry.slug, "menu slug already registered; keeping the first");
            return;
        }

        let slug = entry.slug.clone();
        match &entry.parent {
            Some(parent) => self
                .children
                .entry(parent.clone())
                .or_default()
                .push(slug.clone()),
            None => self.top_level.push(slug.clone()),
        }

        debug!(slug = %slug, parent = ?entry.parent, "registered admin page");
        self.entries.insert(slug, entry);
    }
}
