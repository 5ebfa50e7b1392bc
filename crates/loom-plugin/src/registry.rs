//! Plugin registry: the catalog of plugins, their state and persisted configuration.
//!
//! The registry owns consistency between the lifecycle state of each plugin
//! and what the plugin contributes to the running composition (hooks,
//! routes, middleware, services, admin surface).
//!
//! Locking:
//! - Lifecycle operations on one name are serialized by a per-name mutex.
//!   Different names proceed concurrently.
//! - Staging and publishing a new composition happens under one short
//!   composition lock, never across a plugin callback.
//! - Lock order is name, then composition, then the entry map.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use semver::Version;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use loom_core::config::plugin::PluginRuntimeConfig;
use loom_core::{AppError, AppResult, ErrorKind};

use crate::admin::AdminSurfaceRegistry;
use crate::api::context::PluginContext;
use crate::api::storage::{
    ConfigStore, MemoryConfigStore, MemoryStorage, NamespacedStorage, PluginStorage,
};
use crate::descriptor::{ConfigMap, PluginDescriptor, ServiceRegistration};
use crate::hooks::definitions::events;
use crate::hooks::dispatcher::HookBus;
use crate::lifecycle::{LifecycleManager, LifecycleOp, PluginState};
use crate::manifest::ManifestValidator;
use crate::routes::composer::RouteComposer;
use crate::routes::handler::{RouteRequest, RouteResponse};
use crate::services::{ScopedService, ServiceContainer};

/// One plugin known to the registry.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// The installed descriptor.
    pub descriptor: Arc<PluginDescriptor>,
    /// Current state; never `Unregistered` while the entry exists.
    pub state: PluginState,
    /// Configuration record; survives deactivation, erased on uninstall.
    pub persisted_config: ConfigMap,
    /// When the plugin was installed.
    pub installed_at: DateTime<Utc>,
    /// When the entry last changed.
    pub last_updated_at: DateTime<Utc>,
    /// Activation sequence number while active.
    pub activation_seq: Option<u64>,
    /// Message of the most recent failed operation.
    pub last_error: Option<String>,
}

/// Summary row for administrative listings.
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    /// Plugin name.
    pub name: String,
    /// Plugin version.
    pub version: String,
    /// Description.
    pub description: Option<String>,
    /// Current state.
    pub state: PluginState,
    /// Declared dependencies.
    pub dependencies: Vec<String>,
    /// When the plugin was installed.
    pub installed_at: DateTime<Utc>,
    /// When the entry last changed.
    pub last_updated_at: DateTime<Utc>,
    /// Message of the most recent failed operation.
    pub last_error: Option<String>,
}

/// Registry-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Plugins known to the registry.
    pub total: usize,
    /// Plugins installed but never activated.
    pub installed: usize,
    /// Active plugins.
    pub active: usize,
    /// Deactivated plugins.
    pub inactive: usize,
    /// Registered hook handlers, host handlers included.
    pub hooks: usize,
    /// Mounted routes.
    pub routes: usize,
    /// Mounted middleware.
    pub middleware: usize,
    /// Registered services, global ones included.
    pub services: usize,
}

/// Outcome of [`Registry::activate_all`].
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Plugins activated, in order.
    pub activated: Vec<String>,
    /// Plugins that failed, with the reason.
    pub failed: Vec<(String, AppError)>,
}

/// Authoritative catalog of plugin state and persisted configuration.
#[derive(Debug)]
pub struct Registry {
    config: PluginRuntimeConfig,
    host_version: Version,
    entries: RwLock<HashMap<String, RegistryEntry>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    composition: Mutex<()>,
    hooks: Arc<HookBus>,
    services: Arc<ServiceContainer>,
    routes: Arc<RouteComposer>,
    admin: Arc<AdminSurfaceRegistry>,
    lifecycle: LifecycleManager,
    validator: ManifestValidator,
    config_store: Arc<dyn ConfigStore>,
    storage: Arc<dyn PluginStorage>,
    activation_counter: AtomicU64,
    shut_down: AtomicBool,
}

impl Registry {
    /// Creates a registry with in-memory storage collaborators.
    pub fn new(config: PluginRuntimeConfig) -> AppResult<Self> {
        Self::with_collaborators(
            config,
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Creates a registry over host-provided storage.
    pub fn with_collaborators(
        config: PluginRuntimeConfig,
        config_store: Arc<dyn ConfigStore>,
        storage: Arc<dyn PluginStorage>,
    ) -> AppResult<Self> {
        let host_version = Version::parse(&config.host_version).map_err(|e| {
            AppError::configuration(format!(
                "host_version '{}' is not valid semver: {}",
                config.host_version, e
            ))
        })?;

        info!(
            host_version = %host_version,
            critical_events = ?config.critical_events,
            "Plugin registry created"
        );

        Ok(Self {
            hooks: Arc::new(HookBus::from_config(&config)),
            services: Arc::new(ServiceContainer::new()),
            routes: Arc::new(RouteComposer::new()),
            admin: Arc::new(AdminSurfaceRegistry::new()),
            lifecycle: LifecycleManager::new(config.callback_timeout()),
            validator: ManifestValidator::new(config.reserved_names.iter().cloned()),
            entries: RwLock::new(HashMap::new()),
            locks: DashMap::new(),
            composition: Mutex::new(()),
            activation_counter: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
            host_version,
            config_store,
            storage,
            config,
        })
    }

    // ── Lifecycle ──────────────────────────────────────────────

    /// Installs a descriptor with the default callback timeout.
    pub async fn install(&self, descriptor: Arc<PluginDescriptor>) -> AppResult<()> {
        self.install_within(descriptor, self.lifecycle.default_timeout())
            .await
    }

    /// Installs a descriptor.
    ///
    /// Validates the manifest, checks the name is free and every dependency
    /// is installed in a satisfying version, runs the install callback, and
    /// persists the default configuration (merged over any record imported
    /// earlier). Nothing is recorded if any step fails.
    pub async fn install_within(
        &self,
        descriptor: Arc<PluginDescriptor>,
        timeout: Duration,
    ) -> AppResult<()> {
        self.ensure_running()?;
        let name = descriptor.name().to_string();
        let guard = self.lock_name(&name).await;

        self.validator.validate(descriptor.manifest())?;
        self.validator
            .check_host(descriptor.manifest(), &self.host_version)?;

        {
            let entries = self.entries.read().await;
            let state = entries
                .get(&name)
                .map(|e| e.state)
                .unwrap_or(PluginState::Unregistered);
            if state != PluginState::Unregistered {
                return Err(AppError::duplicate_name(format!(
                    "Plugin '{}' is already installed",
                    name
                )));
            }
            self.lifecycle.check(&name, state, LifecycleOp::Install)?;
            check_dependencies_installed(&descriptor, &entries)?;
            self.check_service_names(&descriptor, &entries)?;
        }

        let stored = self.config_store.load(&name).await?;
        let mut config = descriptor.default_config().clone();
        if let Some(stored) = stored.clone() {
            deep_merge(&mut config, stored);
        }

        let ctx = self.context(&name, config.clone());
        self.lifecycle
            .invoke(descriptor.lifecycle(), LifecycleOp::Install, &ctx, timeout)
            .await?;

        self.config_store.save(&name, &config).await?;

        {
            let mut entries = self.entries.write().await;
            if let Err(e) = check_dependencies_installed(&descriptor, &entries) {
                drop(entries);
                self.restore_config(&name, stored.as_ref()).await;
                return Err(e);
            }
            let now = Utc::now();
            entries.insert(
                name.clone(),
                RegistryEntry {
                    descriptor: descriptor.clone(),
                    state: PluginState::Installed,
                    persisted_config: config,
                    installed_at: now,
                    last_updated_at: now,
                    activation_seq: None,
                    last_error: None,
                },
            );
        }
        drop(guard);

        info!(
            plugin = %name,
            version = %descriptor.version(),
            "Plugin installed"
        );
        self.emit_lifecycle(events::PLUGIN_INSTALL, &descriptor).await;
        Ok(())
    }

    /// Activates a plugin with the default callback timeout.
    pub async fn activate(&self, name: &str) -> AppResult<()> {
        self.activate_within(name, self.lifecycle.default_timeout())
            .await
    }

    /// Activates an installed or inactive plugin.
    ///
    /// Every dependency must be active. The activate callback runs first;
    /// only then are the plugin's routes, middleware, admin contributions,
    /// services and hooks folded into the live composition, all or nothing.
    /// If composition fails the deactivate callback runs as compensation and
    /// the plugin keeps its previous state. Failures are not retried.
    pub async fn activate_within(&self, name: &str, timeout: Duration) -> AppResult<()> {
        self.ensure_running()?;
        let guard = self.lock_name(name).await;

        let entry = self.entry_or_not_found(name).await?;
        self.lifecycle
            .check(name, entry.state, LifecycleOp::Activate)?;
        {
            let entries = self.entries.read().await;
            check_dependencies_active(&entry.descriptor, &entries)?;
        }

        let descriptor = entry.descriptor.clone();
        let ctx = self.context(name, entry.persisted_config.clone());

        if let Err(e) = self
            .lifecycle
            .invoke(descriptor.lifecycle(), LifecycleOp::Activate, &ctx, timeout)
            .await
        {
            self.record_error(name, &e).await;
            return Err(e);
        }

        if let Err(e) = self.compose(&descriptor).await {
            warn!(plugin = %name, error = %e, "Activation rolled back");
            if let Err(comp) = self
                .lifecycle
                .invoke(descriptor.lifecycle(), LifecycleOp::Deactivate, &ctx, timeout)
                .await
            {
                warn!(plugin = %name, error = %comp, "Compensating deactivate callback failed");
            }
            self.record_error(name, &e).await;
            return Err(e);
        }
        drop(guard);

        info!(plugin = %name, "Plugin activated");
        self.emit_lifecycle(events::PLUGIN_ACTIVATE, &descriptor)
            .await;
        Ok(())
    }

    /// Stages and publishes a plugin's contributions, then marks it active.
    async fn compose(&self, descriptor: &Arc<PluginDescriptor>) -> AppResult<()> {
        let name = descriptor.name();
        let _composition = self.composition.lock().await;

        {
            let entries = self.entries.read().await;
            check_dependencies_active(descriptor, &entries)?;
        }

        let seq = self.activation_counter.fetch_add(1, Ordering::Relaxed);
        let staged_routes = self.routes.snapshot().await.with_plugin(descriptor, seq)?;
        let staged_admin = self.admin.snapshot().await.with_plugin(descriptor, seq)?;

        let services: Vec<ScopedService> = descriptor
            .services()
            .iter()
            .map(ServiceRegistration::scoped)
            .collect();
        self.services.register_plugin(name, &services)?;

        // Nothing below can fail.
        self.hooks
            .registry()
            .register_plugin(
                name,
                descriptor
                    .hooks()
                    .iter()
                    .map(|h| (h.event.clone(), h.priority, h.handler.clone())),
            )
            .await;
        self.routes.publish(staged_routes).await;
        self.admin.publish(staged_admin).await;

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.state = PluginState::Active;
            entry.activation_seq = Some(seq);
            entry.last_updated_at = Utc::now();
            entry.last_error = None;
        }

        debug!(plugin = %name, activation_seq = seq, "Plugin composition published");
        Ok(())
    }

    /// Deactivates a plugin with the default callback timeout.
    pub async fn deactivate(&self, name: &str) -> AppResult<()> {
        self.deactivate_within(name, self.lifecycle.default_timeout())
            .await
    }

    /// Deactivates an active plugin.
    ///
    /// Refused while another active plugin depends on it. The deactivate
    /// callback runs first; if it fails the plugin stays active. Then every
    /// contribution is withdrawn. Persisted configuration is kept.
    pub async fn deactivate_within(&self, name: &str, timeout: Duration) -> AppResult<()> {
        self.ensure_running()?;
        self.deactivate_inner(name, timeout).await
    }

    async fn deactivate_inner(&self, name: &str, timeout: Duration) -> AppResult<()> {
        let guard = self.lock_name(name).await;

        let entry = self.entry_or_not_found(name).await?;
        self.lifecycle
            .check(name, entry.state, LifecycleOp::Deactivate)?;
        {
            let entries = self.entries.read().await;
            let dependents = dependents_in(name, &entries, |s| s == PluginState::Active);
            if !dependents.is_empty() {
                return Err(AppError::dependency(format!(
                    "Cannot deactivate '{}': active plugins depend on it: {}",
                    name,
                    dependents.join(", ")
                )));
            }
        }

        let descriptor = entry.descriptor.clone();
        let ctx = self.context(name, entry.persisted_config.clone());
        if let Err(e) = self
            .lifecycle
            .invoke(descriptor.lifecycle(), LifecycleOp::Deactivate, &ctx, timeout)
            .await
        {
            self.record_error(name, &e).await;
            return Err(e);
        }

        if let Err(e) = self.withdraw(name).await {
            warn!(plugin = %name, error = %e, "Deactivation aborted");
            self.record_error(name, &e).await;
            return Err(e);
        }
        drop(guard);

        info!(plugin = %name, "Plugin deactivated");
        self.emit_lifecycle(events::PLUGIN_DEACTIVATE, &descriptor)
            .await;
        Ok(())
    }

    /// Removes a plugin's contributions and marks it inactive.
    ///
    /// Fails with `DependencyError`, leaving the composition untouched, if a
    /// dependent became active while the deactivate callback ran.
    async fn withdraw(&self, name: &str) -> AppResult<()> {
        let _composition = self.composition.lock().await;

        {
            let entries = self.entries.read().await;
            let dependents = dependents_in(name, &entries, |s| s == PluginState::Active);
            if !dependents.is_empty() {
                return Err(AppError::dependency(format!(
                    "Cannot deactivate '{}': plugins activated meanwhile depend on it: {}",
                    name,
                    dependents.join(", ")
                )));
            }
        }

        let hooks = self.hooks.registry().unregister_plugin(name).await;
        let routes = self.routes.snapshot().await.without_plugin(name);
        self.routes.publish(routes).await;
        let admin = self.admin.snapshot().await.without_plugin(name);
        self.admin.publish(admin).await;
        let services = self.services.unregister_plugin(name);

        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.state = PluginState::Inactive;
            entry.activation_seq = None;
            entry.last_updated_at = Utc::now();
        }

        debug!(
            plugin = %name,
            hooks = hooks,
            services = services.len(),
            "Plugin composition withdrawn"
        );
        Ok(())
    }

    /// Uninstalls a plugin with the default callback timeout.
    pub async fn uninstall(&self, name: &str) -> AppResult<()> {
        self.uninstall_within(name, self.lifecycle.default_timeout())
            .await
    }

    /// Removes an installed or inactive plugin and its configuration.
    ///
    /// Active plugins must be deactivated first. Refused while any other
    /// installed plugin depends on it.
    pub async fn uninstall_within(&self, name: &str, timeout: Duration) -> AppResult<()> {
        self.ensure_running()?;
        let guard = self.lock_name(name).await;

        let entry = self.entry_or_not_found(name).await?;
        self.lifecycle
            .check(name, entry.state, LifecycleOp::Uninstall)?;
        {
            let entries = self.entries.read().await;
            let dependents = dependents_in(name, &entries, |_| true);
            if !dependents.is_empty() {
                return Err(AppError::dependency(format!(
                    "Cannot uninstall '{}': installed plugins depend on it: {}",
                    name,
                    dependents.join(", ")
                )));
            }
        }

        let descriptor = entry.descriptor.clone();
        let ctx = self.context(name, entry.persisted_config.clone());
        if let Err(e) = self
            .lifecycle
            .invoke(descriptor.lifecycle(), LifecycleOp::Uninstall, &ctx, timeout)
            .await
        {
            self.record_error(name, &e).await;
            return Err(e);
        }

        {
            let mut entries = self.entries.write().await;
            let dependents = dependents_in(name, &entries, |_| true);
            if !dependents.is_empty() {
                drop(entries);
                let e = AppError::dependency(format!(
                    "Cannot uninstall '{}': plugins installed meanwhile depend on it: {}",
                    name,
                    dependents.join(", ")
                ));
                warn!(plugin = %name, error = %e, "Uninstall aborted");
                self.record_error(name, &e).await;
                return Err(e);
            }
            entries.remove(name);
        }
        self.config_store.delete(name).await?;
        drop(guard);

        info!(plugin = %name, "Plugin uninstalled");
        self.emit_lifecycle(events::PLUGIN_UNINSTALL, &descriptor)
            .await;
        Ok(())
    }

    // ── Configuration ──────────────────────────────────────────

    /// Deep-merges `patch` (a JSON object) into a plugin's configuration.
    ///
    /// If the plugin is active its configure callback sees the merged
    /// record; when that callback fails the previous record is restored.
    /// Returns the merged record.
    pub async fn configure(&self, name: &str, patch: serde_json::Value) -> AppResult<ConfigMap> {
        let serde_json::Value::Object(patch) = patch else {
            return Err(AppError::validation(format!(
                "Configuration patch for '{}' must be an object",
                name
            )));
        };

        self.ensure_running()?;
        let _guard = self.lock_name(name).await;
        let entry = self.entry_or_not_found(name).await?;

        let mut merged = entry.persisted_config.clone();
        deep_merge(&mut merged, patch);
        self.apply_config(name, &entry, merged).await
    }

    /// Replaces a plugin's configuration record.
    pub async fn set_config(&self, name: &str, config: ConfigMap) -> AppResult<ConfigMap> {
        self.ensure_running()?;
        let _guard = self.lock_name(name).await;
        let entry = self.entry_or_not_found(name).await?;
        self.apply_config(name, &entry, config).await
    }

    async fn apply_config(
        &self,
        name: &str,
        entry: &RegistryEntry,
        config: ConfigMap,
    ) -> AppResult<ConfigMap> {
        self.config_store.save(name, &config).await?;
        self.store_entry_config(name, config.clone()).await;

        if entry.state == PluginState::Active {
            let ctx = self.context(name, config.clone());
            if let Err(e) = self
                .lifecycle
                .invoke_configure(
                    entry.descriptor.lifecycle(),
                    &ctx,
                    &config,
                    self.lifecycle.default_timeout(),
                )
                .await
            {
                warn!(plugin = %name, error = %e, "Configuration rejected, restoring previous record");
                self.config_store
                    .save(name, &entry.persisted_config)
                    .await?;
                self.store_entry_config(name, entry.persisted_config.clone())
                    .await;
                self.record_error(name, &e).await;
                return Err(e);
            }
        }

        info!(plugin = %name, keys = config.len(), "Plugin configuration updated");
        Ok(config)
    }

    async fn store_entry_config(&self, name: &str, config: ConfigMap) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.persisted_config = config;
            entry.last_updated_at = Utc::now();
        }
    }

    /// Returns a plugin's configuration record.
    pub async fn get_config(&self, name: &str) -> AppResult<ConfigMap> {
        Ok(self.entry_or_not_found(name).await?.persisted_config)
    }

    /// Returns every installed plugin's configuration record, by name.
    pub async fn export_config(&self) -> BTreeMap<String, ConfigMap> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.persisted_config.clone()))
            .collect()
    }

    /// Imports configuration records.
    ///
    /// Records for installed plugins replace the current ones (and reach
    /// active plugins through their configure callback). Records for
    /// plugins not yet installed are stored and picked up at install.
    /// Returns how many records were applied.
    pub async fn import_config(&self, records: BTreeMap<String, ConfigMap>) -> AppResult<usize> {
        self.ensure_running()?;
        let mut applied = 0;

        for (name, config) in records {
            let _guard = self.lock_name(&name).await;
            match self.entry(&name).await {
                Some(entry) => {
                    self.apply_config(&name, &entry, config).await?;
                }
                None => {
                    self.config_store.save(&name, &config).await?;
                    debug!(plugin = %name, "Configuration staged for a future install");
                }
            }
            applied += 1;
        }

        info!(count = applied, "Plugin configuration imported");
        Ok(applied)
    }

    // ── Queries ────────────────────────────────────────────────

    /// Current state of a plugin; `Unregistered` when unknown.
    pub async fn state(&self, name: &str) -> PluginState {
        self.entries
            .read()
            .await
            .get(name)
            .map(|e| e.state)
            .unwrap_or(PluginState::Unregistered)
    }

    /// A copy of a plugin's entry.
    pub async fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.entries.read().await.get(name).cloned()
    }

    /// Status of every plugin, sorted by name.
    pub async fn list(&self) -> Vec<PluginStatus> {
        let entries = self.entries.read().await;
        let mut rows: Vec<PluginStatus> = entries
            .values()
            .map(|e| {
                let manifest = e.descriptor.manifest();
                PluginStatus {
                    name: manifest.name.clone(),
                    version: manifest.version.to_string(),
                    description: manifest.description.clone(),
                    state: e.state,
                    dependencies: manifest.dependencies.iter().map(|d| d.name.clone()).collect(),
                    installed_at: e.installed_at,
                    last_updated_at: e.last_updated_at,
                    last_error: e.last_error.clone(),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    /// Registry-wide counters.
    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        {
            let entries = self.entries.read().await;
            stats.total = entries.len();
            for entry in entries.values() {
                match entry.state {
                    PluginState::Installed => stats.installed += 1,
                    PluginState::Active => stats.active += 1,
                    PluginState::Inactive => stats.inactive += 1,
                    PluginState::Unregistered => {}
                }
            }
        }
        let table = self.routes.snapshot().await;
        stats.routes = table.routes().len();
        stats.middleware = table.middleware().len();
        stats.hooks = self.hooks.registry().total_count().await;
        stats.services = self.services.len();
        stats
    }

    /// Installed plugin names ordered so every plugin follows its dependencies.
    ///
    /// Ties are broken by name. A dependency cycle is a `CircularDependency` error.
    pub async fn resolve_load_order(&self) -> AppResult<Vec<String>> {
        let graph: BTreeMap<String, Vec<String>> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .map(|(name, e)| {
                    let mut deps: Vec<String> = e
                        .descriptor
                        .manifest()
                        .dependencies
                        .iter()
                        .filter(|d| entries.contains_key(&d.name))
                        .map(|d| d.name.clone())
                        .collect();
                    deps.sort();
                    (name.clone(), deps)
                })
                .collect()
        };

        let mut order = Vec::with_capacity(graph.len());
        let mut done = HashSet::new();
        for name in graph.keys() {
            let mut path = Vec::new();
            visit(name, &graph, &mut done, &mut path, &mut order)?;
        }
        Ok(order)
    }

    /// Activates every installed or inactive plugin in dependency order.
    ///
    /// Failures are collected; a plugin whose dependency failed fails too.
    pub async fn activate_all(&self) -> AppResult<ActivationReport> {
        let mut report = ActivationReport::default();
        for name in self.resolve_load_order().await? {
            if !matches!(
                self.state(&name).await,
                PluginState::Installed | PluginState::Inactive
            ) {
                continue;
            }
            match self.activate(&name).await {
                Ok(()) => report.activated.push(name),
                Err(e) => {
                    error!(plugin = %name, error = %e, "Plugin activation failed");
                    report.failed.push((name, e));
                }
            }
        }
        Ok(report)
    }

    /// Emits `app:shutdown`, deactivates active plugins in reverse activation
    /// order, and refuses any lifecycle operation afterwards.
    pub async fn shutdown(&self) -> AppResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Plugin registry shutting down");
        if let Err(e) = self
            .hooks
            .emit_value(events::APP_SHUTDOWN, serde_json::json!({}))
            .await
        {
            warn!(error = %e, "app:shutdown handler failed");
        }

        let mut active: Vec<(u64, String)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter_map(|(name, e)| e.activation_seq.map(|seq| (seq, name.clone())))
                .collect()
        };
        active.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, name) in active {
            if let Err(e) = self
                .deactivate_inner(&name, self.lifecycle.default_timeout())
                .await
            {
                error!(plugin = %name, error = %e, "Plugin failed to deactivate during shutdown");
            }
        }

        info!("Plugin registry shut down");
        Ok(())
    }

    /// Returns whether [`Registry::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    // ── Composition accessors ──────────────────────────────────

    /// Dispatches a request through the composed routes.
    pub async fn dispatch(&self, request: RouteRequest) -> AppResult<RouteResponse> {
        self.routes.dispatch(request).await
    }

    /// The hook bus.
    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.hooks
    }

    /// The service container.
    pub fn services(&self) -> &Arc<ServiceContainer> {
        &self.services
    }

    /// The route composer.
    pub fn routes(&self) -> &Arc<RouteComposer> {
        &self.routes
    }

    /// The admin surface.
    pub fn admin(&self) -> &Arc<AdminSurfaceRegistry> {
        &self.admin
    }

    /// Runtime configuration.
    pub fn config(&self) -> &PluginRuntimeConfig {
        &self.config
    }

    // ── Internals ──────────────────────────────────────────────

    fn ensure_running(&self) -> AppResult<()> {
        if self.is_shut_down() {
            return Err(AppError::unavailable("Plugin registry has been shut down"));
        }
        Ok(())
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    async fn entry_or_not_found(&self, name: &str) -> AppResult<RegistryEntry> {
        self.entry(name)
            .await
            .ok_or_else(|| AppError::not_found(format!("Plugin '{}' is not installed", name)))
    }

    async fn record_error(&self, name: &str, err: &AppError) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(name) {
            entry.last_error = Some(err.message.clone());
            entry.last_updated_at = Utc::now();
        }
    }

    /// Puts back the record that was stored before a failed install.
    async fn restore_config(&self, name: &str, previous: Option<&ConfigMap>) {
        let restored = match previous {
            Some(record) => self.config_store.save(name, record).await,
            None => self.config_store.delete(name).await,
        };
        if let Err(e) = restored {
            warn!(plugin = %name, error = %e, "Failed to restore configuration");
        }
    }

    fn context(&self, name: &str, config: ConfigMap) -> PluginContext {
        PluginContext::new(
            name,
            config,
            Arc::new(NamespacedStorage::new(self.storage.clone(), name)),
            self.hooks.clone(),
            self.services.clone(),
        )
    }

    fn check_service_names(
        &self,
        descriptor: &PluginDescriptor,
        entries: &HashMap<String, RegistryEntry>,
    ) -> AppResult<()> {
        for service in descriptor.services() {
            if self.services.contains(&service.name) {
                return Err(AppError::duplicate_name(format!(
                    "Service '{}' of plugin '{}' is already registered",
                    service.name,
                    descriptor.name()
                )));
            }
            if let Some(owner) = entries
                .values()
                .find(|e| e.descriptor.services().iter().any(|s| s.name == service.name))
            {
                return Err(AppError::duplicate_name(format!(
                    "Service '{}' of plugin '{}' is already declared by plugin '{}'",
                    service.name,
                    descriptor.name(),
                    owner.descriptor.name()
                )));
            }
        }
        Ok(())
    }

    async fn emit_lifecycle(&self, event: &str, descriptor: &PluginDescriptor) {
        let payload = serde_json::json!({
            "plugin": descriptor.name(),
            "version": descriptor.version().to_string(),
        });
        if let Err(e) = self.hooks.emit_value(event, payload).await {
            warn!(event = %event, plugin = %descriptor.name(), error = %e, "Lifecycle event handler failed");
        }
    }
}

fn check_dependencies_installed(
    descriptor: &PluginDescriptor,
    entries: &HashMap<String, RegistryEntry>,
) -> AppResult<()> {
    for dep in &descriptor.manifest().dependencies {
        let Some(installed) = entries.get(&dep.name) else {
            return Err(AppError::dependency(format!(
                "Plugin '{}' requires '{}', which is not installed",
                descriptor.name(),
                dep.name
            )));
        };
        let version = installed.descriptor.version();
        if !dep.version_req.matches(version) {
            return Err(AppError::dependency(format!(
                "Plugin '{}' requires '{}' {}, but {} is installed",
                descriptor.name(),
                dep.name,
                dep.version_req,
                version
            )));
        }
    }
    Ok(())
}

fn check_dependencies_active(
    descriptor: &PluginDescriptor,
    entries: &HashMap<String, RegistryEntry>,
) -> AppResult<()> {
    for dep in &descriptor.manifest().dependencies {
        let state = entries
            .get(&dep.name)
            .map(|e| e.state)
            .unwrap_or(PluginState::Unregistered);
        if state != PluginState::Active {
            return Err(AppError::dependency(format!(
                "Plugin '{}' requires '{}' to be active (it is {})",
                descriptor.name(),
                dep.name,
                state
            )));
        }
    }
    Ok(())
}

fn dependents_in(
    name: &str,
    entries: &HashMap<String, RegistryEntry>,
    state_filter: impl Fn(PluginState) -> bool,
) -> Vec<String> {
    let mut dependents: Vec<String> = entries
        .iter()
        .filter(|(other, e)| {
            other.as_str() != name && state_filter(e.state) && e.descriptor.manifest().depends_on(name)
        })
        .map(|(other, _)| other.clone())
        .collect();
    dependents.sort();
    dependents
}

fn visit(
    name: &str,
    graph: &BTreeMap<String, Vec<String>>,
    done: &mut HashSet<String>,
    path: &mut Vec<String>,
    order: &mut Vec<String>,
) -> AppResult<()> {
    if done.contains(name) {
        return Ok(());
    }
    if let Some(pos) = path.iter().position(|p| p == name) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(name.to_string());
        return Err(AppError::new(
            ErrorKind::CircularDependency,
            format!("Circular plugin dependency: {}", cycle.join(" -> ")),
        ));
    }

    path.push(name.to_string());
    if let Some(deps) = graph.get(name) {
        for dep in deps {
            visit(dep, graph, done, path, order)?;
        }
    }
    path.pop();

    done.insert(name.to_string());
    order.push(name.to_string());
    Ok(())
}

/// Merges `patch` into `target`: nested objects merge key by key, anything
/// else replaces.
pub fn deep_merge(target: &mut ConfigMap, patch: ConfigMap) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}
