//! Plugin context: the handles a plugin's lifecycle callbacks receive.

use std::sync::Arc;

use loom_core::AppResult;

use super::storage::PluginStorage;
use crate::descriptor::ConfigMap;
use crate::hooks::dispatcher::HookBus;
use crate::services::ServiceContainer;

/// Context passed to every lifecycle callback.
///
/// Cheap to clone; every handle is shared.
#[derive(Clone)]
pub struct PluginContext {
    plugin: String,
    /// The plugin's merged configuration at the time of the call.
    pub config: ConfigMap,
    /// Key/value storage, namespaced to this plugin.
    pub storage: Arc<dyn PluginStorage>,
    /// Logger stamping the plugin name on every event.
    pub logger: PluginLogger,
    /// The runtime's hook bus, for emitting events.
    pub hooks: Arc<HookBus>,
    /// The runtime's service container, for resolving services.
    pub services: Arc<ServiceContainer>,
}

impl PluginContext {
    /// Assembles a context for `plugin`.
    pub fn new(
        plugin: &str,
        config: ConfigMap,
        storage: Arc<dyn PluginStorage>,
        hooks: Arc<HookBus>,
        services: Arc<ServiceContainer>,
    ) -> Self {
        Self {
            plugin: plugin.to_string(),
            config,
            storage,
            logger: PluginLogger::new(plugin),
            hooks,
            services,
        }
    }

    /// Name of the plugin this context belongs to.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Reads one configuration value.
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    /// Reads one configuration value into a typed value.
    pub fn config_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.config.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.plugin)
            .field("config_keys", &self.config.len())
            .finish()
    }
}

/// Structured logger bound to one plugin.
#[derive(Debug, Clone)]
pub struct PluginLogger {
    plugin: String,
}

impl PluginLogger {
    /// Creates a logger for `plugin`.
    pub fn new(plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
        }
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin, "{}", message);
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin, "{}", message);
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin, "{}", message);
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin, "{}", message);
    }
}
