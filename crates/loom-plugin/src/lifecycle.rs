//! Lifecycle state machine and callback invocation.
//!
//! ```text
//! Unregistered --install--> Installed --activate--> Active
//!                           Installed --uninstall--> Unregistered
//! Active --deactivate--> Inactive --activate--> Active
//!                        Inactive --uninstall--> Unregistered
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use loom_core::{AppError, AppResult, ErrorKind};

use crate::api::context::PluginContext;
use crate::descriptor::ConfigMap;

/// Where a plugin is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// Not known to the registry.
    Unregistered,
    /// Installed but never activated.
    Installed,
    /// Contributions are live.
    Active,
    /// Deactivated; configuration retained.
    Inactive,
}

impl PluginState {
    /// All states.
    pub const ALL: [PluginState; 4] = [
        PluginState::Unregistered,
        PluginState::Installed,
        PluginState::Active,
        PluginState::Inactive,
    ];

    /// The state `op` leads to from `self`, or `None` if the edge does not exist.
    pub fn transition(self, op: LifecycleOp) -> Option<PluginState> {
        use LifecycleOp::*;
        use PluginState::*;

        match (self, op) {
            (Unregistered, Install) => Some(Installed),
            (Installed, Activate) | (Inactive, Activate) => Some(Active),
            (Active, Deactivate) => Some(Inactive),
            (Installed, Uninstall) | (Inactive, Uninstall) => Some(Unregistered),
            _ => None,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered => write!(f, "unregistered"),
            Self::Installed => write!(f, "installed"),
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
        }
    }
}

/// A lifecycle operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOp {
    /// Install a descriptor.
    Install,
    /// Activate an installed or inactive plugin.
    Activate,
    /// Deactivate an active plugin.
    Deactivate,
    /// Remove an installed or inactive plugin.
    Uninstall,
}

impl LifecycleOp {
    /// All operations.
    pub const ALL: [LifecycleOp; 4] = [
        LifecycleOp::Install,
        LifecycleOp::Activate,
        LifecycleOp::Deactivate,
        LifecycleOp::Uninstall,
    ];

    /// Name used in logs and lifecycle events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
            Self::Uninstall => "uninstall",
        }
    }
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks a plugin runs at each lifecycle transition.
///
/// Every method defaults to doing nothing.
#[async_trait]
pub trait PluginLifecycle: Send + Sync + std::fmt::Debug {
    /// Runs once when the plugin is installed.
    async fn install(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Runs before the plugin's contributions go live.
    async fn activate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Runs before the plugin's contributions are withdrawn.
    async fn deactivate(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Runs before the plugin and its configuration are removed.
    async fn uninstall(&self, _ctx: &PluginContext) -> AppResult<()> {
        Ok(())
    }

    /// Runs when an active plugin's configuration changes.
    async fn configure(&self, _ctx: &PluginContext, _config: &ConfigMap) -> AppResult<()> {
        Ok(())
    }
}

/// Lifecycle with no callbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl PluginLifecycle for NoopLifecycle {}

type ContextCallback = Arc<dyn Fn(PluginContext) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;
type ConfigureCallback =
    Arc<dyn Fn(PluginContext, ConfigMap) -> BoxFuture<'static, AppResult<()>> + Send + Sync>;

/// Lifecycle assembled from individual closures.
#[derive(Default, Clone)]
pub struct CallbackSet {
    install: Option<ContextCallback>,
    activate: Option<ContextCallback>,
    deactivate: Option<ContextCallback>,
    uninstall: Option<ContextCallback>,
    configure: Option<ConfigureCallback>,
}

fn boxed<F, Fut>(f: F) -> ContextCallback
where
    F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: PluginContext| -> BoxFuture<'static, AppResult<()>> { Box::pin(f(ctx)) })
}

impl CallbackSet {
    /// Sets the install callback.
    pub fn set_install<F, Fut>(&mut self, f: F)
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.install = Some(boxed(f));
    }

    /// Sets the activate callback.
    pub fn set_activate<F, Fut>(&mut self, f: F)
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.activate = Some(boxed(f));
    }

    /// Sets the deactivate callback.
    pub fn set_deactivate<F, Fut>(&mut self, f: F)
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.deactivate = Some(boxed(f));
    }

    /// Sets the uninstall callback.
    pub fn set_uninstall<F, Fut>(&mut self, f: F)
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.uninstall = Some(boxed(f));
    }

    /// Sets the configure callback.
    pub fn set_configure<F, Fut>(&mut self, f: F)
    where
        F: Fn(PluginContext, ConfigMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.configure = Some(Arc::new(
            move |ctx: PluginContext, config: ConfigMap| -> BoxFuture<'static, AppResult<()>> {
                Box::pin(f(ctx, config))
            },
        ));
    }

    /// Returns whether no callback is set.
    pub fn is_empty(&self) -> bool {
        self.install.is_none()
            && self.activate.is_none()
            && self.deactivate.is_none()
            && self.uninstall.is_none()
            && self.configure.is_none()
    }

    async fn run(callback: &Option<ContextCallback>, ctx: &PluginContext) -> AppResult<()> {
        match callback {
            Some(f) => f(ctx.clone()).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CallbackSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("install", &self.install.is_some())
            .field("activate", &self.activate.is_some())
            .field("deactivate", &self.deactivate.is_some())
            .field("uninstall", &self.uninstall.is_some())
            .field("configure", &self.configure.is_some())
            .finish()
    }
}

#[async_trait]
impl PluginLifecycle for CallbackSet {
    async fn install(&self, ctx: &PluginContext) -> AppResult<()> {
        Self::run(&self.install, ctx).await
    }

    async fn activate(&self, ctx: &PluginContext) -> AppResult<()> {
        Self::run(&self.activate, ctx).await
    }

    async fn deactivate(&self, ctx: &PluginContext) -> AppResult<()> {
        Self::run(&self.deactivate, ctx).await
    }

    async fn uninstall(&self, ctx: &PluginContext) -> AppResult<()> {
        Self::run(&self.uninstall, ctx).await
    }

    async fn configure(&self, ctx: &PluginContext, config: &ConfigMap) -> AppResult<()> {
        match &self.configure {
            Some(f) => f(ctx.clone(), config.clone()).await,
            None => Ok(()),
        }
    }
}

/// Checks transitions and runs callbacks under a time bound.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    default_timeout: Duration,
}

impl LifecycleManager {
    /// Creates a manager whose callbacks time out after `default_timeout`.
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Timeout used when the caller supplies none.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Returns the target state of `op`, or `InvalidTransition`.
    pub fn check(&self, plugin: &str, current: PluginState, op: LifecycleOp) -> AppResult<PluginState> {
        current.transition(op).ok_or_else(|| {
            AppError::invalid_transition(format!(
                "Cannot {} plugin '{}' while it is {}",
                op, plugin, current
            ))
        })
    }

    /// Runs the callback for `op`.
    ///
    /// Errors, panics and timeouts all come back as `LifecycleCallback`.
    pub async fn invoke(
        &self,
        lifecycle: &Arc<dyn PluginLifecycle>,
        op: LifecycleOp,
        ctx: &PluginContext,
        timeout: Duration,
    ) -> AppResult<()> {
        let callback = async {
            match op {
                LifecycleOp::Install => lifecycle.install(ctx).await,
                LifecycleOp::Activate => lifecycle.activate(ctx).await,
                LifecycleOp::Deactivate => lifecycle.deactivate(ctx).await,
                LifecycleOp::Uninstall => lifecycle.uninstall(ctx).await,
            }
        };
        self.guard(ctx.plugin(), op.as_str(), callback, timeout).await
    }

    /// Runs the configure callback with the merged configuration.
    pub async fn invoke_configure(
        &self,
        lifecycle: &Arc<dyn PluginLifecycle>,
        ctx: &PluginContext,
        config: &ConfigMap,
        timeout: Duration,
    ) -> AppResult<()> {
        self.guard(ctx.plugin(), "configure", lifecycle.configure(ctx, config), timeout)
            .await
    }

    async fn guard<F>(&self, plugin: &str, callback: &str, fut: F, timeout: Duration) -> AppResult<()>
    where
        F: Future<Output = AppResult<()>>,
    {
        debug!(plugin = %plugin, callback = %callback, "Invoking lifecycle callback");

        let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(fut).catch_unwind()).await;
        let result = match outcome {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(AppError::with_source(
                ErrorKind::LifecycleCallback,
                format!("{} callback of plugin '{}' failed: {}", callback, plugin, e.message),
                e,
            )),
            Ok(Err(_)) => Err(AppError::lifecycle_callback(format!(
                "{} callback of plugin '{}' panicked",
                callback, plugin
            ))),
            Err(_) => Err(AppError::lifecycle_callback(format!(
                "{} callback of plugin '{}' timed out after {:?}",
                callback, plugin, timeout
            ))),
        };

        if let Err(e) = &result {
            error!(plugin = %plugin, callback = %callback, error = %e, "Lifecycle callback failed");
        }
        result
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
