//! Plugin builder: fluent accumulator producing an immutable [`PluginDescriptor`].
//!
//! ```rust,ignore
//! let mut builder = PluginBuilder::new("cache", "1.0.0");
//! builder
//!     .metadata(Metadata { license: Some("MIT".into()), ..Metadata::default() })?
//!     .add_route("/admin/cache", handler, RouteOptions::default())?
//!     .add_hook(events::CONTENT_UPDATE, invalidate, HookOptions::default())?
//!     .on_activate(|ctx| async move { ctx.logger.info("warming"); Ok(()) })?;
//! let descriptor = builder.build()?;
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use loom_core::{AppError, AppResult};

use crate::api::context::PluginContext;
use crate::descriptor::{
    AdminPage, ConfigMap, HookRegistration, MenuItem, MiddlewareRegistration, MiddlewareScope,
    PluginDescriptor, RouteRegistration, ServiceRegistration,
};
use crate::hooks::definitions::is_namespaced;
use crate::hooks::registry::HookHandler;
use crate::lifecycle::{CallbackSet, NoopLifecycle, PluginLifecycle};
use crate::manifest::{DependencySpec, ManifestFile};
use crate::routes::handler::{Middleware, RouteHandler};
use crate::routes::{normalize_path, prefix_matches};
use crate::services::ServiceProvider;

/// Default priority of hooks and middleware.
pub const DEFAULT_PRIORITY: i32 = 10;
/// Default menu order.
pub const DEFAULT_MENU_ORDER: i32 = 100;
/// More middleware than this in one plugin draws a warning.
pub const MIDDLEWARE_WARN_THRESHOLD: usize = 5;
/// More hooks than this in one plugin draws a warning.
pub const HOOK_WARN_THRESHOLD: usize = 10;

/// Optional manifest fields.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Description.
    pub description: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// SPDX license identifier.
    pub license: Option<String>,
    /// Host compatibility range.
    pub compatibility: Option<String>,
}

/// Options for [`PluginBuilder::add_route`].
#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    /// Require an authenticated principal.
    pub requires_auth: bool,
    /// Require one of these roles.
    pub roles: Vec<String>,
    /// Tie-breaker between equally long prefixes.
    pub priority: i32,
    /// Description.
    pub description: Option<String>,
}

/// Options for [`PluginBuilder::add_middleware`].
#[derive(Debug, Clone)]
pub struct MiddlewareOptions {
    /// Where the middleware applies.
    pub scope: MiddlewareScope,
    /// Lower runs first.
    pub priority: i32,
}

impl MiddlewareOptions {
    /// Applies to every request.
    pub fn global() -> Self {
        Self::default()
    }

    /// Applies to requests under the given patterns.
    pub fn routes<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: MiddlewareScope::Routes(patterns.into_iter().map(Into::into).collect()),
            priority: DEFAULT_PRIORITY,
        }
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            scope: MiddlewareScope::Global,
            priority: DEFAULT_PRIORITY,
        }
    }
}

/// Options for [`PluginBuilder::add_hook`].
#[derive(Debug, Clone)]
pub struct HookOptions {
    /// Lower runs first.
    pub priority: i32,
}

impl HookOptions {
    /// Options with the given priority.
    pub fn priority(priority: i32) -> Self {
        Self { priority }
    }
}

impl Default for HookOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
        }
    }
}

/// Options for [`PluginBuilder::add_service`].
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Cache the first resolution.
    pub singleton: bool,
    /// Description.
    pub description: Option<String>,
}

impl ServiceOptions {
    /// A service built fresh on every resolution.
    pub fn transient() -> Self {
        Self {
            singleton: false,
            description: None,
        }
    }
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            singleton: true,
            description: None,
        }
    }
}

/// Options for [`PluginBuilder::add_menu_item`].
#[derive(Debug, Clone)]
pub struct MenuItemOptions {
    /// Icon name.
    pub icon: Option<String>,
    /// Ascending sort key.
    pub order: i32,
    /// Permissions of which the viewer needs one.
    pub permissions: Vec<String>,
    /// Parent item label.
    pub parent: Option<String>,
}

impl Default for MenuItemOptions {
    fn default() -> Self {
        Self {
            icon: None,
            order: DEFAULT_MENU_ORDER,
            permissions: Vec::new(),
            parent: None,
        }
    }
}

/// Options for [`PluginBuilder::add_admin_page`].
#[derive(Debug, Clone, Default)]
pub struct AdminPageOptions {
    /// Description.
    pub description: Option<String>,
    /// Icon name.
    pub icon: Option<String>,
    /// Permissions of which the viewer needs one.
    pub permissions: Vec<String>,
}

/// Accumulates a plugin's contributions until [`PluginBuilder::build`].
pub struct PluginBuilder {
    manifest: ManifestFile,
    routes: Vec<RouteRegistration>,
    middleware: Vec<MiddlewareRegistration>,
    hooks: Vec<HookRegistration>,
    services: Vec<ServiceRegistration>,
    menu_items: Vec<MenuItem>,
    admin_pages: Vec<AdminPage>,
    lifecycle: Option<Arc<dyn PluginLifecycle>>,
    callbacks: CallbackSet,
    default_config: ConfigMap,
    strict_middleware_scopes: bool,
    built: Option<Arc<PluginDescriptor>>,
}

impl PluginBuilder {
    /// Starts a plugin definition.
    pub fn new(name: &str, version: &str) -> Self {
        Self::from_manifest(ManifestFile {
            name: name.to_string(),
            version: version.to_string(),
            ..ManifestFile::default()
        })
    }

    /// Starts a plugin definition from a parsed manifest file.
    pub fn from_manifest(manifest: ManifestFile) -> Self {
        Self {
            manifest,
            routes: Vec::new(),
            middleware: Vec::new(),
            hooks: Vec::new(),
            services: Vec::new(),
            menu_items: Vec::new(),
            admin_pages: Vec::new(),
            lifecycle: None,
            callbacks: CallbackSet::default(),
            default_config: ConfigMap::new(),
            strict_middleware_scopes: false,
            built: None,
        }
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.built.is_some() {
            return Err(AppError::builder_finalized(format!(
                "Plugin '{}' has already been built",
                self.manifest.name
            )));
        }
        Ok(())
    }

    /// Sets optional manifest fields; unset fields keep their current value.
    pub fn metadata(&mut self, metadata: Metadata) -> AppResult<&mut Self> {
        self.ensure_open()?;
        if metadata.description.is_some() {
            self.manifest.description = metadata.description;
        }
        if metadata.author.is_some() {
            self.manifest.author = metadata.author;
        }
        if metadata.license.is_some() {
            self.manifest.license = metadata.license;
        }
        if metadata.compatibility.is_some() {
            self.manifest.compatibility = metadata.compatibility;
        }
        Ok(self)
    }

    /// Declares a dependency on another plugin.
    pub fn dependency(&mut self, name: &str, version_req: &str) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.manifest.dependencies.push(DependencySpec::Full {
            name: name.to_string(),
            version: Some(version_req.to_string()),
        });
        Ok(self)
    }

    /// Mounts a handler under a path prefix.
    pub fn add_route(
        &mut self,
        path_prefix: &str,
        handler: Arc<dyn RouteHandler>,
        options: RouteOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.routes.push(RouteRegistration {
            path_prefix: path_prefix.to_string(),
            handler,
            requires_auth: options.requires_auth,
            roles: options.roles,
            priority: options.priority,
            description: options.description,
        });
        Ok(self)
    }

    /// Adds a middleware.
    pub fn add_middleware(
        &mut self,
        name: &str,
        handler: Arc<dyn Middleware>,
        options: MiddlewareOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.middleware.push(MiddlewareRegistration {
            name: name.to_string(),
            scope: options.scope,
            priority: options.priority,
            handler,
        });
        Ok(self)
    }

    /// Subscribes a handler to an event.
    pub fn add_hook(
        &mut self,
        event: &str,
        handler: Arc<dyn HookHandler>,
        options: HookOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.hooks.push(HookRegistration {
            event: event.to_string(),
            handler,
            priority: options.priority,
        });
        Ok(self)
    }

    /// Contributes a named service.
    pub fn add_service(
        &mut self,
        name: &str,
        provider: ServiceProvider,
        options: ServiceOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.services.push(ServiceRegistration {
            name: name.to_string(),
            provider,
            singleton: options.singleton,
            description: options.description,
        });
        Ok(self)
    }

    /// Contributes an admin page.
    pub fn add_admin_page(
        &mut self,
        path: &str,
        title: &str,
        component: &str,
        options: AdminPageOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.admin_pages.push(AdminPage {
            path: path.to_string(),
            title: title.to_string(),
            component: component.to_string(),
            description: options.description,
            icon: options.icon,
            permissions: options.permissions,
        });
        Ok(self)
    }

    /// Contributes an admin menu item.
    pub fn add_menu_item(
        &mut self,
        label: &str,
        path: &str,
        options: MenuItemOptions,
    ) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.menu_items.push(MenuItem {
            label: label.to_string(),
            path: path.to_string(),
            icon: options.icon,
            order: options.order,
            permissions: options.permissions,
            parent: options.parent,
        });
        Ok(self)
    }

    /// Sets all lifecycle callbacks from one implementation.
    pub fn lifecycle<L: PluginLifecycle + 'static>(&mut self, lifecycle: L) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.lifecycle = Some(Arc::new(lifecycle));
        Ok(self)
    }

    /// Sets the install callback.
    pub fn on_install<F, Fut>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.ensure_open()?;
        self.callbacks.set_install(f);
        Ok(self)
    }

    /// Sets the activate callback.
    pub fn on_activate<F, Fut>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.ensure_open()?;
        self.callbacks.set_activate(f);
        Ok(self)
    }

    /// Sets the deactivate callback.
    pub fn on_deactivate<F, Fut>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.ensure_open()?;
        self.callbacks.set_deactivate(f);
        Ok(self)
    }

    /// Sets the uninstall callback.
    pub fn on_uninstall<F, Fut>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.ensure_open()?;
        self.callbacks.set_uninstall(f);
        Ok(self)
    }

    /// Sets the configure callback.
    pub fn on_configure<F, Fut>(&mut self, f: F) -> AppResult<&mut Self>
    where
        F: Fn(PluginContext, ConfigMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.ensure_open()?;
        self.callbacks.set_configure(f);
        Ok(self)
    }

    /// Declares the configuration persisted at install. Must be a JSON object.
    pub fn default_config(&mut self, config: serde_json::Value) -> AppResult<&mut Self> {
        self.ensure_open()?;
        match config {
            serde_json::Value::Object(map) => {
                self.default_config = map;
                Ok(self)
            }
            other => Err(AppError::validation(format!(
                "Default config of plugin '{}' must be an object, got {}",
                self.manifest.name, other
            ))),
        }
    }

    /// Rejects middleware scoped to patterns none of this plugin's routes cover.
    pub fn strict_middleware_scopes(&mut self, strict: bool) -> AppResult<&mut Self> {
        self.ensure_open()?;
        self.strict_middleware_scopes = strict;
        Ok(self)
    }

    /// Validates the accumulated definition and freezes it.
    ///
    /// Calling `build` again returns the same descriptor.
    pub fn build(&mut self) -> AppResult<Arc<PluginDescriptor>> {
        if let Some(built) = &self.built {
            return Ok(built.clone());
        }

        let name = self.manifest.name.clone();
        let mut errors = Vec::new();

        let manifest = match self.manifest.clone().into_manifest() {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                errors.push(e.message);
                None
            }
        };

        let mut service_names = HashSet::new();
        for service in &self.services {
            if service.name.is_empty() {
                errors.push("service name must not be empty".to_string());
            } else if !service_names.insert(service.name.as_str()) {
                return Err(AppError::duplicate_name(format!(
                    "Plugin '{}' declares service '{}' twice",
                    name, service.name
                )));
            }
        }

        let mut prefixes = HashSet::new();
        for route in &self.routes {
            if !route.path_prefix.starts_with('/') {
                errors.push(format!("route prefix '{}' must start with '/'", route.path_prefix));
            } else if !prefixes.insert(normalize_path(&route.path_prefix)) {
                errors.push(format!("route prefix '{}' is declared twice", route.path_prefix));
            }
        }

        let mut warnings = Vec::new();
        let mut middleware_names = HashSet::new();
        for mw in &self.middleware {
            if mw.name.is_empty() {
                errors.push("middleware name must not be empty".to_string());
            } else if !middleware_names.insert(mw.name.as_str()) {
                errors.push(format!("middleware '{}' is declared twice", mw.name));
            }

            if let MiddlewareScope::Routes(patterns) = &mw.scope {
                if patterns.is_empty() {
                    errors.push(format!("middleware '{}' has an empty route scope", mw.name));
                }
                for pattern in patterns {
                    if !pattern.starts_with('/') {
                        errors.push(format!(
                            "middleware '{}' pattern '{}' must start with '/'",
                            mw.name, pattern
                        ));
                        continue;
                    }
                    let covered = self.routes.iter().any(|r| {
                        prefix_matches(pattern, &r.path_prefix) || prefix_matches(&r.path_prefix, pattern)
                    });
                    if !covered {
                        let problem = format!(
                            "middleware '{}' pattern '{}' matches none of the plugin's routes",
                            mw.name, pattern
                        );
                        if self.strict_middleware_scopes {
                            errors.push(problem);
                        } else {
                            warnings.push(problem);
                        }
                    }
                }
            }
        }
        if self.middleware.len() > MIDDLEWARE_WARN_THRESHOLD {
            warnings.push(format!(
                "plugin defines {} middleware, consider consolidating",
                self.middleware.len()
            ));
        }

        for hook in &self.hooks {
            if hook.event.is_empty() {
                errors.push("hook event must not be empty".to_string());
            } else if !is_namespaced(&hook.event) {
                warnings.push(format!(
                    "hook event '{}' should be namespaced (e.g. 'plugin:event')",
                    hook.event
                ));
            }
        }
        if self.hooks.len() > HOOK_WARN_THRESHOLD {
            warnings.push(format!(
                "plugin defines {} hooks, ensure they are necessary",
                self.hooks.len()
            ));
        }

        for item in &self.menu_items {
            if item.label.is_empty() {
                errors.push("menu item label must not be empty".to_string());
            }
            if !item.path.starts_with('/') {
                errors.push(format!("menu item path '{}' must start with '/'", item.path));
            }
        }

        let mut page_paths = HashSet::new();
        for page in &self.admin_pages {
            if !page.path.starts_with('/') {
                errors.push(format!("admin page path '{}' must start with '/'", page.path));
            } else if !page_paths.insert(page.path.as_str()) {
                errors.push(format!("admin page path '{}' is declared twice", page.path));
            }
            if page.title.is_empty() {
                errors.push(format!("admin page '{}' needs a title", page.path));
            }
        }

        if self.lifecycle.is_some() && !self.callbacks.is_empty() {
            errors.push("lifecycle() and on_* callbacks cannot be combined".to_string());
        }

        let manifest = match manifest {
            Some(manifest) if errors.is_empty() => manifest,
            _ => {
                return Err(AppError::validation(format!(
                    "Plugin '{}' is invalid: {}",
                    name,
                    errors.join("; ")
                )));
            }
        };

        for warning in &warnings {
            warn!(plugin = %name, "{}", warning);
        }

        let lifecycle: Arc<dyn PluginLifecycle> = match (&self.lifecycle, self.callbacks.is_empty()) {
            (Some(lifecycle), _) => lifecycle.clone(),
            (None, false) => Arc::new(self.callbacks.clone()),
            (None, true) => Arc::new(NoopLifecycle),
        };

        let descriptor = Arc::new(PluginDescriptor {
            manifest,
            routes: std::mem::take(&mut self.routes),
            middleware: std::mem::take(&mut self.middleware),
            hooks: std::mem::take(&mut self.hooks),
            services: std::mem::take(&mut self.services),
            menu_items: std::mem::take(&mut self.menu_items),
            admin_pages: std::mem::take(&mut self.admin_pages),
            lifecycle,
            default_config: std::mem::take(&mut self.default_config),
        });

        debug!(
            plugin = %name,
            routes = descriptor.routes.len(),
            middleware = descriptor.middleware.len(),
            hooks = descriptor.hooks.len(),
            services = descriptor.services.len(),
            "Plugin descriptor built"
        );

        self.built = Some(descriptor.clone());
        Ok(descriptor)
    }
}

impl std::fmt::Debug for PluginBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginBuilder")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("routes", &self.routes.len())
            .field("built", &self.built.is_some())
            .finish()
    }
}
