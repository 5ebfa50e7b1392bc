//! Service container: named singleton/factory services resolved lazily.
//!
//! Global services (registered by the host) live for the container's
//! lifetime. Plugin-scoped services are registered when their plugin
//! activates and dropped, cached instance included, when it deactivates.
//! Names are unique across both scopes.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info};

use loom_core::{AppError, AppResult};

/// A resolved service instance.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// A factory building a service, possibly resolving other services first.
pub type ServiceFactory =
    Arc<dyn Fn(&mut ServiceResolver<'_>) -> AppResult<ServiceInstance> + Send + Sync>;

/// How a service is produced.
#[derive(Clone)]
pub enum ServiceProvider {
    /// A ready-made implementation, shared by every resolution.
    Instance(ServiceInstance),
    /// A factory invoked on resolution.
    Factory(ServiceFactory),
}

impl ServiceProvider {
    /// Wraps a ready-made implementation.
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        Self::Instance(Arc::new(value))
    }

    /// Wraps a typed factory.
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut ServiceResolver<'_>) -> AppResult<T> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move |resolver| {
            let value = factory(resolver)?;
            Ok(Arc::new(value) as ServiceInstance)
        }))
    }
}

impl std::fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instance(_) => write!(f, "ServiceProvider::Instance"),
            Self::Factory(_) => write!(f, "ServiceProvider::Factory(<closure>)"),
        }
    }
}

/// Who owns a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceScope {
    /// Registered by the host; lives as long as the container.
    Global,
    /// Registered by an active plugin; removed on deactivation.
    Plugin(String),
}

#[derive(Debug)]
struct ServiceSlot {
    scope: ServiceScope,
    provider: ServiceProvider,
    singleton: bool,
    cached: OnceLock<ServiceInstance>,
}

/// A plugin's service contribution, as handed to [`ServiceContainer::register_plugin`].
#[derive(Debug, Clone)]
pub struct ScopedService {
    /// Unique service name.
    pub name: String,
    /// How to produce it.
    pub provider: ServiceProvider,
    /// Cache the first resolution.
    pub singleton: bool,
}

/// Process-wide named service registry.
#[derive(Debug, Default)]
pub struct ServiceContainer {
    slots: DashMap<String, Arc<ServiceSlot>>,
}

impl ServiceContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service. Fails with `DuplicateName` if the name is taken.
    pub fn register(
        &self,
        name: &str,
        provider: ServiceProvider,
        singleton: bool,
        scope: ServiceScope,
    ) -> AppResult<()> {
        match self.slots.entry(name.to_string()) {
            Entry::Occupied(existing) => Err(AppError::duplicate_name(format!(
                "Service '{}' is already registered ({})",
                name,
                describe_scope(&existing.get().scope)
            ))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(ServiceSlot {
                    scope,
                    provider,
                    singleton,
                    cached: OnceLock::new(),
                }));
                debug!(service = %name, singleton = singleton, "Service registered");
                Ok(())
            }
        }
    }

    /// Registers a host-owned service.
    pub fn register_global(
        &self,
        name: &str,
        provider: ServiceProvider,
        singleton: bool,
    ) -> AppResult<()> {
        self.register(name, provider, singleton, ServiceScope::Global)
    }

    /// Registers all services of a plugin, all-or-nothing.
    pub fn register_plugin(&self, plugin: &str, services: &[ScopedService]) -> AppResult<()> {
        let mut registered: Vec<&str> = Vec::with_capacity(services.len());

        for service in services {
            let outcome = self.register(
                &service.name,
                service.provider.clone(),
                service.singleton,
                ServiceScope::Plugin(plugin.to_string()),
            );
            if let Err(e) = outcome {
                for name in registered {
                    self.slots.remove(name);
                }
                return Err(e);
            }
            registered.push(&service.name);
        }

        if !registered.is_empty() {
            info!(plugin = %plugin, count = registered.len(), "Plugin services registered");
        }
        Ok(())
    }

    /// Removes every service owned by a plugin. Returns the removed names.
    pub fn unregister_plugin(&self, plugin: &str) -> Vec<String> {
        let owned = self.plugin_services(plugin);
        for name in &owned {
            self.slots.remove(name);
        }
        if !owned.is_empty() {
            debug!(plugin = %plugin, count = owned.len(), "Plugin services dropped");
        }
        owned
    }

    /// Resolves a service by name.
    pub fn resolve(&self, name: &str) -> AppResult<ServiceInstance> {
        ServiceResolver::new(self).resolve(name)
    }

    /// Resolves a service and downcasts it.
    pub fn resolve_as<T: Any + Send + Sync>(&self, name: &str) -> AppResult<Arc<T>> {
        ServiceResolver::new(self).resolve_as(name)
    }

    /// Returns whether a service name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Returns the names of a plugin's services, sorted.
    pub fn plugin_services(&self, plugin: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| matches!(&slot.scope, ServiceScope::Plugin(owner) if owner == plugin))
            .map(|slot| slot.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Returns all registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.iter().map(|slot| slot.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// One resolution chain. Tracks the names currently being built so a
/// factory that (transitively) asks for itself fails instead of recursing.
pub struct ServiceResolver<'a> {
    container: &'a ServiceContainer,
    stack: Vec<String>,
}

impl<'a> ServiceResolver<'a> {
    fn new(container: &'a ServiceContainer) -> Self {
        Self {
            container,
            stack: Vec::new(),
        }
    }

    /// Resolves a service inside the current chain.
    pub fn resolve(&mut self, name: &str) -> AppResult<ServiceInstance> {
        if self.stack.iter().any(|n| n == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(AppError::circular_dependency(format!(
                "Circular service dependency: {}",
                chain.join(" -> ")
            )));
        }

        // Clone the slot out so no map guard is held while the factory runs.
        let slot = self
            .container
            .slots
            .get(name)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| AppError::not_found(format!("Service '{}' is not registered", name)))?;

        if slot.singleton {
            if let Some(instance) = slot.cached.get() {
                return Ok(instance.clone());
            }
        }

        let instance = match &slot.provider {
            ServiceProvider::Instance(instance) => instance.clone(),
            ServiceProvider::Factory(factory) => {
                self.stack.push(name.to_string());
                let built = factory(self);
                self.stack.pop();
                built?
            }
        };

        if slot.singleton {
            // A concurrent first resolution may have won; keep its instance.
            let _ = slot.cached.set(instance.clone());
            return Ok(slot.cached.get().cloned().unwrap_or(instance));
        }

        Ok(instance)
    }

    /// Resolves a service inside the current chain and downcasts it.
    pub fn resolve_as<T: Any + Send + Sync>(&mut self, name: &str) -> AppResult<Arc<T>> {
        self.resolve(name)?.downcast::<T>().map_err(|_| {
            AppError::validation(format!(
                "Service '{}' is not a {}",
                name,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Names currently being resolved, outermost first.
    pub fn chain(&self) -> &[String] {
        &self.stack
    }
}

fn describe_scope(scope: &ServiceScope) -> String {
    match scope {
        ServiceScope::Global => "global".to_string(),
        ServiceScope::Plugin(owner) => format!("plugin '{}'", owner),
    }
}
