//! Test support: a registry wired to in-memory collaborators, and a
//! lifecycle that records its calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use loom_core::config::plugin::PluginRuntimeConfig;
use loom_core::{AppError, AppResult};
use loom_plugin::api::storage::{MemoryConfigStore, MemoryStorage};
use loom_plugin::{
    ConfigMap, HookPayload, LifecycleOp, PluginContext, PluginDescriptor, PluginLifecycle,
    Registry, RouteRequest, RouteResponse,
};

/// Timeout the harness uses for callbacks and hooks unless overridden.
pub const HARNESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A registry plus direct access to its in-memory storage.
#[derive(Debug)]
pub struct TestHarness {
    registry: Arc<Registry>,
    config_store: Arc<MemoryConfigStore>,
    storage: Arc<MemoryStorage>,
}

impl TestHarness {
    /// Creates a harness with default configuration and short timeouts.
    pub fn new() -> AppResult<Self> {
        let millis = HARNESS_TIMEOUT.as_millis() as u64;
        Self::with_config(PluginRuntimeConfig {
            callback_timeout_ms: millis,
            hook_timeout_ms: millis,
            ..PluginRuntimeConfig::default()
        })
    }

    /// Creates a harness with explicit configuration.
    pub fn with_config(config: PluginRuntimeConfig) -> AppResult<Self> {
        let config_store = Arc::new(MemoryConfigStore::new());
        let storage = Arc::new(MemoryStorage::new());
        let registry = Registry::with_collaborators(config, config_store.clone(), storage.clone())?;
        Ok(Self {
            registry: Arc::new(registry),
            config_store,
            storage,
        })
    }

    /// The registry under test.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Backing configuration store.
    pub fn config_store(&self) -> &Arc<MemoryConfigStore> {
        &self.config_store
    }

    /// Backing plugin storage (keys are `plugin:<name>:<key>`).
    pub fn storage(&self) -> &Arc<MemoryStorage> {
        &self.storage
    }

    /// Installs and activates a descriptor.
    pub async fn install_and_activate(&self, descriptor: Arc<PluginDescriptor>) -> AppResult<()> {
        let name = descriptor.name().to_string();
        self.registry.install(descriptor).await?;
        self.registry.activate(&name).await
    }

    /// Dispatches a `GET` through the composed routes.
    pub async fn get(&self, path: &str) -> AppResult<RouteResponse> {
        self.registry.dispatch(RouteRequest::get(path)).await
    }

    /// Emits an event and returns the payload handlers produced.
    pub async fn emit(&self, event: &str, data: serde_json::Value) -> AppResult<HookPayload> {
        self.registry.hooks().emit_value(event, data).await
    }
}

/// One recorded lifecycle call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleCall {
    /// Plugin the callback ran for.
    pub plugin: String,
    /// Callback name: `install`, `activate`, `deactivate`, `uninstall` or `configure`.
    pub callback: String,
}

/// Lifecycle that records every call and can be told to fail one callback.
#[derive(Debug, Clone, Default)]
pub struct RecordingLifecycle {
    calls: Arc<Mutex<Vec<LifecycleCall>>>,
    fail_on: Arc<Mutex<Option<String>>>,
    delay: Option<Duration>,
}

impl RecordingLifecycle {
    /// Creates a recorder that succeeds on every callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every callback sleep first; pair with a short timeout to
    /// simulate a hung plugin.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the named callback fail until [`RecordingLifecycle::succeed`] is called.
    pub async fn fail_on(&self, callback: &str) {
        *self.fail_on.lock().await = Some(callback.to_string());
    }

    /// Makes every callback succeed again.
    pub async fn succeed(&self) {
        *self.fail_on.lock().await = None;
    }

    /// Calls recorded so far.
    pub async fn calls(&self) -> Vec<LifecycleCall> {
        self.calls.lock().await.clone()
    }

    /// Callback names recorded so far.
    pub async fn callbacks(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|c| c.callback.clone())
            .collect()
    }

    async fn record(&self, ctx: &PluginContext, callback: &str) -> AppResult<()> {
        self.calls.lock().await.push(LifecycleCall {
            plugin: ctx.plugin().to_string(),
            callback: callback.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.lock().await.as_deref() == Some(callback) {
            return Err(AppError::internal(format!("{} failed on purpose", callback)));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginLifecycle for RecordingLifecycle {
    async fn install(&self, ctx: &PluginContext) -> AppResult<()> {
        self.record(ctx, LifecycleOp::Install.as_str()).await
    }

    async fn activate(&self, ctx: &PluginContext) -> AppResult<()> {
        self.record(ctx, LifecycleOp::Activate.as_str()).await
    }

    async fn deactivate(&self, ctx: &PluginContext) -> AppResult<()> {
        self.record(ctx, LifecycleOp::Deactivate.as_str()).await
    }

    async fn uninstall(&self, ctx: &PluginContext) -> AppResult<()> {
        self.record(ctx, LifecycleOp::Uninstall.as_str()).await
    }

    async fn configure(&self, ctx: &PluginContext, _config: &ConfigMap) -> AppResult<()> {
        self.record(ctx, "configure").await
    }
}
