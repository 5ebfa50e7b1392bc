//! Hook bus: dispatches events to registered handlers in priority order.
//!
//! Each `emit`:
//! - Snapshots the handler list, then runs handlers one at a time in
//!   ascending priority, all sharing the same mutable payload.
//! - Skips handlers that were unregistered after the snapshot was taken.
//! - Stops early if a handler calls `payload.cancel()`.
//! - For ordinary events, isolates failures (error, panic or timeout):
//!   they are logged and collected, and dispatch continues.
//! - For critical events, the first failure aborts the remaining handlers
//!   and is returned to the emitter as a `HookExecution` error.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use futures::FutureExt;
use tracing::{debug, error, warn};

use loom_core::config::plugin::PluginRuntimeConfig;
use loom_core::{AppError, AppResult, ErrorKind};

use super::definitions::HookPayload;
use super::registry::{HookHandler, HookId, HookRegistry};

/// Plugin name used for handlers registered directly by the host.
pub const HOST_PLUGIN: &str = "host";

/// One isolated handler failure.
#[derive(Debug, Clone)]
pub struct HookFailure {
    /// Plugin owning the failing handler.
    pub plugin: String,
    /// Event being dispatched.
    pub event: String,
    /// The failure, always of kind `HookExecution`.
    pub error: AppError,
}

/// Aggregated result of dispatching an event.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    /// Handlers that were invoked (successfully or not).
    pub invoked: usize,
    /// Handlers skipped because they were removed mid-dispatch.
    pub skipped: usize,
    /// Isolated failures, in dispatch order.
    pub failures: Vec<HookFailure>,
    /// Plugin whose handler cancelled the dispatch, if any.
    pub cancelled_by: Option<String>,
}

impl DispatchResult {
    /// Returns whether every invoked handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Priority-ordered publish/subscribe dispatcher.
#[derive(Debug)]
pub struct HookBus {
    registry: Arc<HookRegistry>,
    critical: DashSet<String>,
    handler_timeout: Duration,
}

impl HookBus {
    /// Creates a bus over a registry with the given per-handler timeout.
    pub fn new(registry: Arc<HookRegistry>, handler_timeout: Duration) -> Self {
        Self {
            registry,
            critical: DashSet::new(),
            handler_timeout,
        }
    }

    /// Creates a bus with timeout and critical events taken from configuration.
    pub fn from_config(config: &PluginRuntimeConfig) -> Self {
        let bus = Self::new(Arc::new(HookRegistry::new()), config.hook_timeout());
        for event in &config.critical_events {
            bus.mark_critical(event);
        }
        bus
    }

    /// Registers a host-owned handler.
    pub async fn on(&self, event: &str, handler: Arc<dyn HookHandler>, priority: i32) -> HookId {
        self.registry
            .register(event, HOST_PLUGIN, priority, handler)
            .await
    }

    /// Removes a single registration.
    pub async fn off(&self, id: HookId) -> bool {
        self.registry.unregister(id).await
    }

    /// Marks an event as critical.
    pub fn mark_critical(&self, event: &str) {
        self.critical.insert(event.to_string());
    }

    /// Returns whether an event is critical.
    pub fn is_critical(&self, event: &str) -> bool {
        self.critical.contains(event)
    }

    /// Returns all critical events, sorted.
    pub fn critical_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self.critical.iter().map(|e| e.key().clone()).collect();
        events.sort();
        events
    }

    /// Dispatches `event` to every registered handler.
    pub async fn emit(&self, event: &str, payload: &mut HookPayload) -> AppResult<DispatchResult> {
        payload.reset_for(event);
        let handlers = self.registry.snapshot(event).await;
        let mut result = DispatchResult::default();

        if handlers.is_empty() {
            return Ok(result);
        }

        let critical = self.is_critical(event);
        debug!(
            event = %event,
            handler_count = handlers.len(),
            critical = critical,
            "Dispatching event"
        );

        for entry in &handlers {
            if !entry.is_live() {
                debug!(event = %event, plugin = %entry.plugin(), "Skipping removed handler");
                result.skipped += 1;
                continue;
            }

            result.invoked += 1;
            let outcome = tokio::time::timeout(
                self.handler_timeout,
                AssertUnwindSafe(entry.handler().handle(payload)).catch_unwind(),
            )
            .await;

            let failure = match outcome {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(AppError::with_source(
                    ErrorKind::HookExecution,
                    format!(
                        "Handler of plugin '{}' failed on '{}': {}",
                        entry.plugin(),
                        event,
                        e.message
                    ),
                    e,
                )),
                Ok(Err(panic)) => Some(AppError::hook_execution(format!(
                    "Handler of plugin '{}' panicked on '{}': {}",
                    entry.plugin(),
                    event,
                    panic_message(panic.as_ref())
                ))),
                Err(_) => Some(AppError::hook_execution(format!(
                    "Handler of plugin '{}' timed out on '{}' after {:?}",
                    entry.plugin(),
                    event,
                    self.handler_timeout
                ))),
            };

            if let Some(err) = failure {
                if critical {
                    error!(
                        event = %event,
                        plugin = %entry.plugin(),
                        error = %err,
                        "Critical hook handler failed, aborting dispatch"
                    );
                    return Err(err);
                }

                warn!(
                    event = %event,
                    plugin = %entry.plugin(),
                    error = %err,
                    "Hook handler failed, continuing dispatch"
                );
                result.failures.push(HookFailure {
                    plugin: entry.plugin().to_string(),
                    event: event.to_string(),
                    error: err,
                });
            }

            if payload.is_cancelled() {
                debug!(event = %event, plugin = %entry.plugin(), "Dispatch cancelled by handler");
                result.cancelled_by = Some(entry.plugin().to_string());
                break;
            }
        }

        Ok(result)
    }

    /// Emits an event built from a JSON value and returns the annotated payload.
    pub async fn emit_value(&self, event: &str, data: serde_json::Value) -> AppResult<HookPayload> {
        let mut payload = HookPayload::from_value(data);
        self.emit(event, &mut payload).await?;
        Ok(payload)
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
