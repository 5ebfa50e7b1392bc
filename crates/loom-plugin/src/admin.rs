//! Admin surface: menu items and admin pages contributed by active plugins.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use loom_core::{AppError, AppResult};

use crate::descriptor::{AdminPage, MenuItem, PluginDescriptor};
use crate::principal::Principal;

#[derive(Debug)]
struct Mounted<T> {
    plugin: String,
    activation_seq: u64,
    index: usize,
    item: T,
}

/// A menu entry with its visible children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuNode {
    /// The entry.
    pub item: MenuItem,
    /// Entries naming this one as parent, in menu order.
    pub children: Vec<MenuNode>,
}

/// Merged admin contributions of the active plugins. Immutable; changes
/// produce a new value.
#[derive(Debug, Default, Clone)]
pub struct AdminSurface {
    menu: Vec<Arc<Mounted<MenuItem>>>,
    pages: Vec<Arc<Mounted<AdminPage>>>,
}

impl AdminSurface {
    /// Creates an empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new surface that also contains `descriptor`'s admin contributions.
    ///
    /// Fails with `RouteConflict` if another active plugin owns one of its page paths.
    pub fn with_plugin(&self, descriptor: &PluginDescriptor, activation_seq: u64) -> AppResult<Self> {
        let plugin = descriptor.name();

        for page in descriptor.admin_pages() {
            if let Some(existing) = self.pages.iter().find(|p| p.item.path == page.path) {
                warn!(plugin = %plugin, path = %page.path, owner = %existing.plugin, "Admin page conflict");
                return Err(AppError::route_conflict(format!(
                    "Admin page '{}' of plugin '{}' is already provided by plugin '{}'",
                    page.path, plugin, existing.plugin
                )));
            }
        }

        let mut surface = self.clone();
        surface
            .menu
            .extend(descriptor.menu_items().iter().enumerate().map(|(index, item)| {
                Arc::new(Mounted {
                    plugin: plugin.to_string(),
                    activation_seq,
                    index,
                    item: item.clone(),
                })
            }));
        surface
            .pages
            .extend(descriptor.admin_pages().iter().enumerate().map(|(index, page)| {
                Arc::new(Mounted {
                    plugin: plugin.to_string(),
                    activation_seq,
                    index,
                    item: page.clone(),
                })
            }));
        surface
            .menu
            .sort_by_key(|m| (m.item.order, m.activation_seq, m.index));
        surface.pages.sort_by_key(|p| (p.activation_seq, p.index));

        debug!(
            plugin = %plugin,
            menu_items = descriptor.menu_items().len(),
            pages = descriptor.admin_pages().len(),
            "Admin surface staged with plugin"
        );
        Ok(surface)
    }

    /// Returns a new surface without `plugin`'s contributions.
    pub fn without_plugin(&self, plugin: &str) -> Self {
        Self {
            menu: self.menu.iter().filter(|m| m.plugin != plugin).cloned().collect(),
            pages: self.pages.iter().filter(|p| p.plugin != plugin).cloned().collect(),
        }
    }

    /// Menu items visible to `principal`, ordered by `order` then activation order.
    pub fn menu_for(&self, principal: &Principal) -> Vec<MenuItem> {
        self.menu
            .iter()
            .filter(|m| principal.can_see(&m.item.permissions))
            .map(|m| m.item.clone())
            .collect()
    }

    /// Admin pages visible to `principal`.
    pub fn pages_for(&self, principal: &Principal) -> Vec<AdminPage> {
        self.pages
            .iter()
            .filter(|p| principal.can_see(&p.item.permissions))
            .map(|p| p.item.clone())
            .collect()
    }

    /// Looks up a page by path, if `principal` may see it.
    pub fn page(&self, path: &str, principal: &Principal) -> Option<AdminPage> {
        self.pages
            .iter()
            .find(|p| p.item.path == path && principal.can_see(&p.item.permissions))
            .map(|p| p.item.clone())
    }

    /// The visible menu as a tree.
    ///
    /// Items whose parent is missing or hidden surface at the top level.
    pub fn menu_tree(&self, principal: &Principal) -> Vec<MenuNode> {
        let visible = self.menu_for(principal);
        let labels: HashSet<&str> = visible.iter().map(|i| i.label.as_str()).collect();

        let mut placed = HashSet::new();
        let mut roots: Vec<MenuNode> = Vec::new();
        for (i, item) in visible.iter().enumerate() {
            let nested = item
                .parent
                .as_deref()
                .is_some_and(|p| p != item.label && labels.contains(p));
            if !nested {
                placed.insert(i);
                roots.push(MenuNode {
                    item: item.clone(),
                    children: children_of(&item.label, &visible, &mut placed),
                });
            }
        }

        // Parent cycles leave items unreachable from any root.
        for (i, item) in visible.iter().enumerate() {
            if !placed.contains(&i) {
                placed.insert(i);
                roots.push(MenuNode {
                    item: item.clone(),
                    children: Vec::new(),
                });
            }
        }
        roots
    }

    /// Menu labels contributed by `plugin`.
    pub fn plugin_menu(&self, plugin: &str) -> Vec<String> {
        self.menu
            .iter()
            .filter(|m| m.plugin == plugin)
            .map(|m| m.item.label.clone())
            .collect()
    }

    /// Admin page paths contributed by `plugin`.
    pub fn plugin_pages(&self, plugin: &str) -> Vec<String> {
        self.pages
            .iter()
            .filter(|p| p.plugin == plugin)
            .map(|p| p.item.path.clone())
            .collect()
    }

    /// Returns whether any of `plugin`'s contributions are present.
    pub fn contains_plugin(&self, plugin: &str) -> bool {
        self.menu.iter().any(|m| m.plugin == plugin) || self.pages.iter().any(|p| p.plugin == plugin)
    }
}

fn children_of(label: &str, items: &[MenuItem], placed: &mut HashSet<usize>) -> Vec<MenuNode> {
    let mut children = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if placed.contains(&i) || item.parent.as_deref() != Some(label) {
            continue;
        }
        placed.insert(i);
        children.push(MenuNode {
            item: item.clone(),
            children: children_of(&item.label, items, placed),
        });
    }
    children
}

/// Owner of the live [`AdminSurface`].
#[derive(Debug, Default)]
pub struct AdminSurfaceRegistry {
    current: RwLock<Arc<AdminSurface>>,
}

impl AdminSurfaceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the surface in effect right now.
    pub async fn snapshot(&self) -> Arc<AdminSurface> {
        self.current.read().await.clone()
    }

    /// Replaces the live surface.
    pub async fn publish(&self, surface: AdminSurface) {
        *self.current.write().await = Arc::new(surface);
    }

    /// Menu visible to `principal`.
    pub async fn menu_for(&self, principal: &Principal) -> Vec<MenuItem> {
        self.snapshot().await.menu_for(principal)
    }

    /// Menu tree visible to `principal`.
    pub async fn menu_tree(&self, principal: &Principal) -> Vec<MenuNode> {
        self.snapshot().await.menu_tree(principal)
    }

    /// Pages visible to `principal`.
    pub async fn pages_for(&self, principal: &Principal) -> Vec<AdminPage> {
        self.snapshot().await.pages_for(principal)
    }
}
