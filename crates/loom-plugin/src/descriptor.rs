//! Plugin descriptor: the immutable, fully-built set of a plugin's contributions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hooks::registry::HookHandler;
use crate::lifecycle::PluginLifecycle;
use crate::manifest::Manifest;
use crate::routes::handler::{Middleware, RouteHandler};
use crate::services::{ScopedService, ServiceProvider};

/// A plugin's configuration record.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// A route mount.
#[derive(Debug, Clone)]
pub struct RouteRegistration {
    /// Path prefix the handler is mounted under.
    pub path_prefix: String,
    /// The handler.
    pub handler: Arc<dyn RouteHandler>,
    /// Reject requests without a principal.
    pub requires_auth: bool,
    /// Roles of which the principal needs at least one. Empty means any.
    pub roles: Vec<String>,
    /// Tie-breaker between equally long prefixes; lower wins.
    pub priority: i32,
    /// Human-readable description.
    pub description: Option<String>,
}

/// Where a middleware applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiddlewareScope {
    /// Every request.
    Global,
    /// Requests whose path matches one of these patterns. A trailing `/*`
    /// is accepted and ignored; matching is by path segment prefix.
    Routes(Vec<String>),
}

/// A middleware contribution.
#[derive(Debug, Clone)]
pub struct MiddlewareRegistration {
    /// Name, unique within the plugin.
    pub name: String,
    /// Where it applies.
    pub scope: MiddlewareScope,
    /// Lower runs first within its scope class.
    pub priority: i32,
    /// The middleware.
    pub handler: Arc<dyn Middleware>,
}

/// A hook subscription.
#[derive(Debug, Clone)]
pub struct HookRegistration {
    /// Event name.
    pub event: String,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
    /// Lower runs first.
    pub priority: i32,
}

/// A service contribution.
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    /// Name, unique process-wide.
    pub name: String,
    /// Implementation or factory.
    pub provider: ServiceProvider,
    /// Cache the first resolution for the plugin's activation lifetime.
    pub singleton: bool,
    /// Human-readable description.
    pub description: Option<String>,
}

impl ServiceRegistration {
    pub(crate) fn scoped(&self) -> ScopedService {
        ScopedService {
            name: self.name.clone(),
            provider: self.provider.clone(),
            singleton: self.singleton,
        }
    }
}

/// An admin menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Label shown in the menu; also how children refer to their parent.
    pub label: String,
    /// Target path.
    pub path: String,
    /// Icon name.
    pub icon: Option<String>,
    /// Ascending sort key.
    pub order: i32,
    /// Permissions of which the viewer needs at least one. Empty means everyone.
    pub permissions: Vec<String>,
    /// Label of the parent item, if nested.
    pub parent: Option<String>,
}

/// An admin page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminPage {
    /// Page path, unique across active plugins.
    pub path: String,
    /// Page title.
    pub title: String,
    /// Reference to the UI component rendering the page.
    pub component: String,
    /// Description.
    pub description: Option<String>,
    /// Icon name.
    pub icon: Option<String>,
    /// Permissions of which the viewer needs at least one. Empty means everyone.
    pub permissions: Vec<String>,
}

/// Finalized plugin definition produced by [`crate::builder::PluginBuilder::build`].
///
/// Never mutated after construction; a changed plugin is rebuilt and
/// re-installed.
#[derive(Debug)]
pub struct PluginDescriptor {
    pub(crate) manifest: Manifest,
    pub(crate) routes: Vec<RouteRegistration>,
    pub(crate) middleware: Vec<MiddlewareRegistration>,
    pub(crate) hooks: Vec<HookRegistration>,
    pub(crate) services: Vec<ServiceRegistration>,
    pub(crate) menu_items: Vec<MenuItem>,
    pub(crate) admin_pages: Vec<AdminPage>,
    pub(crate) lifecycle: Arc<dyn PluginLifecycle>,
    pub(crate) default_config: ConfigMap,
}

impl PluginDescriptor {
    /// Plugin name.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Plugin version.
    pub fn version(&self) -> &semver::Version {
        &self.manifest.version
    }

    /// The manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Route mounts in declaration order.
    pub fn routes(&self) -> &[RouteRegistration] {
        &self.routes
    }

    /// Middleware in declaration order.
    pub fn middleware(&self) -> &[MiddlewareRegistration] {
        &self.middleware
    }

    /// Hook subscriptions in declaration order.
    pub fn hooks(&self) -> &[HookRegistration] {
        &self.hooks
    }

    /// Services in declaration order.
    pub fn services(&self) -> &[ServiceRegistration] {
        &self.services
    }

    /// Menu items in declaration order.
    pub fn menu_items(&self) -> &[MenuItem] {
        &self.menu_items
    }

    /// Admin pages in declaration order.
    pub fn admin_pages(&self) -> &[AdminPage] {
        &self.admin_pages
    }

    /// Lifecycle callbacks.
    pub fn lifecycle(&self) -> &Arc<dyn PluginLifecycle> {
        &self.lifecycle
    }

    /// Configuration persisted at install.
    pub fn default_config(&self) -> &ConfigMap {
        &self.default_config
    }
}
