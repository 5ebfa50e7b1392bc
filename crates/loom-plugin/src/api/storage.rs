//! Storage collaborators: plugin key/value storage and persisted plugin configuration.
//!
//! The host provides real implementations backed by its database; the
//! in-memory ones here back tests and the demo host.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use loom_core::AppResult;

use crate::descriptor::ConfigMap;

/// Key/value storage available to plugin code.
#[async_trait]
pub trait PluginStorage: Send + Sync + std::fmt::Debug {
    /// Gets a value.
    async fn get(&self, key: &str) -> AppResult<Option<serde_json::Value>>;
    /// Sets a value.
    async fn set(&self, key: &str, value: serde_json::Value) -> AppResult<()>;
    /// Deletes a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> AppResult<bool>;
    /// Lists keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, serde_json::Value>,
}

impl MemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStorage for MemoryStorage {
    async fn get(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> AppResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        Ok(self.values.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .values
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// Storage view that isolates one plugin's keys under a prefix.
#[derive(Debug, Clone)]
pub struct NamespacedStorage {
    inner: Arc<dyn PluginStorage>,
    prefix: String,
}

impl NamespacedStorage {
    /// Creates a view for `plugin` over shared storage.
    pub fn new(inner: Arc<dyn PluginStorage>, plugin: &str) -> Self {
        Self {
            inner,
            prefix: format!("plugin:{}:", plugin),
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl PluginStorage for NamespacedStorage {
    async fn get(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        self.inner.get(&self.full_key(key)).await
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> AppResult<()> {
        self.inner.set(&self.full_key(key), value).await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let keys = self.inner.keys(&self.full_key(prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

/// Persistence of plugin configuration records, used by the registry.
#[async_trait]
pub trait ConfigStore: Send + Sync + std::fmt::Debug {
    /// Loads a plugin's record.
    async fn load(&self, plugin: &str) -> AppResult<Option<ConfigMap>>;
    /// Saves a plugin's record, replacing any previous one.
    async fn save(&self, plugin: &str, config: &ConfigMap) -> AppResult<()>;
    /// Deletes a plugin's record.
    async fn delete(&self, plugin: &str) -> AppResult<()>;
}

/// Process-local configuration store.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    records: DashMap<String, ConfigMap>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self, plugin: &str) -> AppResult<Option<ConfigMap>> {
        Ok(self.records.get(plugin).map(|r| r.value().clone()))
    }

    async fn save(&self, plugin: &str, config: &ConfigMap) -> AppResult<()> {
        self.records.insert(plugin.to_string(), config.clone());
        Ok(())
    }

    async fn delete(&self, plugin: &str) -> AppResult<()> {
        self.records.remove(plugin);
        Ok(())
    }
}
