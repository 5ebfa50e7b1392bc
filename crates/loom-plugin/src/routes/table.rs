//! Immutable dispatch table built from the active plugins' contributions.
//!
//! A table is never modified in place. Adding or removing a plugin yields a
//! new table which the [`super::RouteComposer`] publishes in one swap, so a
//! request always runs against one consistent composition.

use std::sync::Arc;

use tracing::{debug, warn};

use loom_core::{AppError, AppResult};

use super::handler::{MiddlewareFlow, RouteRequest, RouteResponse};
use super::{normalize_path, prefix_matches};
use crate::descriptor::{MiddlewareRegistration, MiddlewareScope, PluginDescriptor, RouteRegistration};

/// A route mount owned by an active plugin.
#[derive(Debug)]
pub struct MountedRoute {
    /// Owning plugin.
    pub plugin: String,
    /// Normalized prefix.
    pub prefix: String,
    /// Activation sequence number of the owner; earlier wins ties.
    pub activation_seq: u64,
    /// Position in the owner's declaration order.
    pub index: usize,
    /// The registration itself.
    pub registration: RouteRegistration,
}

/// A middleware owned by an active plugin.
#[derive(Debug)]
pub struct MountedMiddleware {
    /// Owning plugin.
    pub plugin: String,
    /// Activation sequence number of the owner.
    pub activation_seq: u64,
    /// Position in the owner's declaration order.
    pub index: usize,
    /// The registration itself.
    pub registration: MiddlewareRegistration,
}

impl MountedMiddleware {
    fn is_global(&self) -> bool {
        self.registration.scope == MiddlewareScope::Global
    }

    fn applies_to(&self, path: &str) -> bool {
        match &self.registration.scope {
            MiddlewareScope::Global => true,
            MiddlewareScope::Routes(patterns) => patterns.iter().any(|p| prefix_matches(p, path)),
        }
    }

    fn sort_key(&self) -> (i32, u64, usize) {
        (self.registration.priority, self.activation_seq, self.index)
    }
}

/// The composed routes and middleware of every active plugin.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    /// Sorted: longest prefix first, then priority, activation order, declaration order.
    routes: Vec<Arc<MountedRoute>>,
    /// Sorted: priority, activation order, declaration order.
    middleware: Vec<Arc<MountedMiddleware>>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new table that also contains `descriptor`'s contributions.
    ///
    /// Fails with `RouteConflict` if any of its prefixes is already mounted
    /// by another plugin. `self` is left untouched either way.
    pub fn with_plugin(&self, descriptor: &PluginDescriptor, activation_seq: u64) -> AppResult<Self> {
        let plugin = descriptor.name();

        for route in descriptor.routes() {
            let prefix = normalize_path(&route.path_prefix);
            if let Some(existing) = self.routes.iter().find(|r| r.prefix == prefix) {
                warn!(
                    plugin = %plugin,
                    prefix = %prefix,
                    owner = %existing.plugin,
                    "Route prefix conflict"
                );
                return Err(AppError::route_conflict(format!(
                    "Route prefix '{}' of plugin '{}' is already mounted by plugin '{}'",
                    prefix, plugin, existing.plugin
                )));
            }
        }

        let mut table = self.clone();
        table.routes.extend(descriptor.routes().iter().enumerate().map(|(index, route)| {
            Arc::new(MountedRoute {
                plugin: plugin.to_string(),
                prefix: normalize_path(&route.path_prefix).to_string(),
                activation_seq,
                index,
                registration: route.clone(),
            })
        }));
        table.middleware.extend(
            descriptor
                .middleware()
                .iter()
                .enumerate()
                .map(|(index, mw)| {
                    Arc::new(MountedMiddleware {
                        plugin: plugin.to_string(),
                        activation_seq,
                        index,
                        registration: mw.clone(),
                    })
                }),
        );
        table.sort();

        debug!(
            plugin = %plugin,
            routes = descriptor.routes().len(),
            middleware = descriptor.middleware().len(),
            "Route table staged with plugin"
        );
        Ok(table)
    }

    /// Returns a new table without any of `plugin`'s contributions.
    pub fn without_plugin(&self, plugin: &str) -> Self {
        Self {
            routes: self
                .routes
                .iter()
                .filter(|r| r.plugin != plugin)
                .cloned()
                .collect(),
            middleware: self
                .middleware
                .iter()
                .filter(|m| m.plugin != plugin)
                .cloned()
                .collect(),
        }
    }

    fn sort(&mut self) {
        self.routes.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then(a.registration.priority.cmp(&b.registration.priority))
                .then(a.activation_seq.cmp(&b.activation_seq))
                .then(a.index.cmp(&b.index))
        });
        self.middleware.sort_by_key(|m| m.sort_key());
    }

    /// Finds the route serving `path`: longest matching prefix wins.
    pub fn match_route(&self, path: &str) -> Option<&Arc<MountedRoute>> {
        self.routes.iter().find(|r| prefix_matches(&r.prefix, path))
    }

    /// Middleware that runs for `path`: global first, then route-scoped,
    /// each group in ascending priority.
    pub fn middleware_chain(&self, path: &str) -> Vec<Arc<MountedMiddleware>> {
        let globals = self.middleware.iter().filter(|m| m.is_global());
        let scoped = self
            .middleware
            .iter()
            .filter(|m| !m.is_global() && m.applies_to(path));
        globals.chain(scoped).cloned().collect()
    }

    /// Runs a request through the composed pipeline.
    ///
    /// Global middleware, then route lookup (404 when nothing matches),
    /// then the auth gate (401 without a principal, 403 without a required
    /// role), then route-scoped middleware, then the handler. Any
    /// middleware may answer early.
    pub async fn dispatch(&self, mut request: RouteRequest) -> AppResult<RouteResponse> {
        for mw in self.middleware.iter().filter(|m| m.is_global()) {
            if let MiddlewareFlow::Respond(response) = mw.registration.handler.handle(&mut request).await? {
                debug!(middleware = %mw.registration.name, plugin = %mw.plugin, "Request answered by global middleware");
                return Ok(response);
            }
        }

        let Some(route) = self.match_route(&request.path) else {
            return Ok(RouteResponse::not_found(&request.path));
        };

        let registration = &route.registration;
        if registration.requires_auth || !registration.roles.is_empty() {
            match &request.principal {
                None => return Ok(RouteResponse::unauthorized()),
                Some(principal) if !principal.has_any_role(&registration.roles) => {
                    return Ok(RouteResponse::forbidden());
                }
                Some(_) => {}
            }
        }

        let scoped: Vec<Arc<MountedMiddleware>> = self
            .middleware
            .iter()
            .filter(|m| !m.is_global() && m.applies_to(&request.path))
            .cloned()
            .collect();
        for mw in scoped {
            if let MiddlewareFlow::Respond(response) = mw.registration.handler.handle(&mut request).await? {
                debug!(middleware = %mw.registration.name, plugin = %mw.plugin, "Request answered by route middleware");
                return Ok(response);
            }
        }

        registration.handler.handle(&request).await
    }

    /// All mounted routes in match order.
    pub fn routes(&self) -> &[Arc<MountedRoute>] {
        &self.routes
    }

    /// All mounted middleware in run order.
    pub fn middleware(&self) -> &[Arc<MountedMiddleware>] {
        &self.middleware
    }

    /// Prefixes mounted by `plugin`.
    pub fn plugin_routes(&self, plugin: &str) -> Vec<String> {
        self.routes
            .iter()
            .filter(|r| r.plugin == plugin)
            .map(|r| r.prefix.clone())
            .collect()
    }

    /// Names of middleware contributed by `plugin`.
    pub fn plugin_middleware(&self, plugin: &str) -> Vec<String> {
        self.middleware
            .iter()
            .filter(|m| m.plugin == plugin)
            .map(|m| m.registration.name.clone())
            .collect()
    }

    /// Returns whether any of `plugin`'s contributions are mounted.
    pub fn contains_plugin(&self, plugin: &str) -> bool {
        self.routes.iter().any(|r| r.plugin == plugin)
            || self.middleware.iter().any(|m| m.plugin == plugin)
    }
}
