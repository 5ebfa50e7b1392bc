//! Shared test helpers for integration tests.

use std::sync::{Arc, Mutex};

use loom_plugin::registry::RegistryStats;
use loom_plugin_sdk::prelude::*;
use loom_plugin_sdk::testing::{RecordingLifecycle, TestHarness};

/// Order in which hook handlers ran, by tag.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Create a fresh harness with in-memory storage
pub fn harness() -> TestHarness {
    TestHarness::new().expect("Failed to create test harness")
}

/// Route handler answering with its owner and the request path
pub fn echo(owner: &str) -> Arc<dyn RouteHandler> {
    let owner = owner.to_string();
    route_fn(move |request: RouteRequest| {
        let owner = owner.clone();
        async move {
            Ok(RouteResponse::ok(json!({
                "plugin": owner,
                "path": request.path,
            })))
        }
    })
}

/// Plugin mounting one echo route per prefix
pub fn route_plugin(name: &str, prefixes: &[&str]) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new(name, "1.0.0");
    for prefix in prefixes {
        builder
            .add_route(prefix, echo(name), RouteOptions::default())
            .expect("Failed to add route");
    }
    builder.build().expect("Failed to build plugin")
}

/// Plugin whose lifecycle callbacks go to `recorder`
pub fn recorded_plugin(name: &str, recorder: &RecordingLifecycle) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new(name, "1.0.0");
    builder
        .lifecycle(recorder.clone())
        .expect("Failed to set lifecycle");
    builder.build().expect("Failed to build plugin")
}

/// Hook handler that appends `tag` to `log`
pub fn logging_hook(log: &CallLog, tag: &str) -> Arc<dyn HookHandler> {
    let log = log.clone();
    let tag = tag.to_string();
    sync_hook_fn(move |_payload| {
        log.lock().expect("call log poisoned").push(tag.clone());
        Ok(())
    })
}

/// Tags recorded so far
pub fn logged(log: &CallLog) -> Vec<String> {
    log.lock().expect("call log poisoned").clone()
}

/// Plugin contributing one of every kind of composition entry
pub fn full_plugin(name: &str, log: &CallLog) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new(name, "1.0.0");
    builder
        .add_route(&format!("/{}", name), echo(name), RouteOptions::default())
        .expect("Failed to add route")
        .add_middleware(
            &format!("{}-audit", name),
            sync_middleware_fn(|_request| Ok(MiddlewareFlow::Next)),
            MiddlewareOptions::global(),
        )
        .expect("Failed to add middleware")
        .add_hook(events::CONTENT_UPDATE, logging_hook(log, name), HookOptions::default())
        .expect("Failed to add hook")
        .add_service(
            &format!("{}-service", name),
            ServiceProvider::instance(name.to_string()),
            ServiceOptions::default(),
        )
        .expect("Failed to add service")
        .add_menu_item(name, &format!("/admin/{}", name), MenuItemOptions::default())
        .expect("Failed to add menu item")
        .add_admin_page(
            &format!("/admin/{}", name),
            name,
            "SettingsPage",
            AdminPageOptions::default(),
        )
        .expect("Failed to add admin page");
    builder.build().expect("Failed to build plugin")
}

/// Everything the composition currently exposes, for before/after comparisons.
#[derive(Debug, PartialEq, Eq)]
pub struct CompositionSnapshot {
    pub routes: Vec<String>,
    pub middleware: usize,
    pub hooks: Vec<(String, usize)>,
    pub services: Vec<String>,
    pub menu: Vec<String>,
    pub pages: Vec<String>,
}

/// Capture the composition as seen by an unprivileged principal
pub async fn composition(harness: &TestHarness) -> CompositionSnapshot {
    let registry = harness.registry();
    let table = registry.routes().snapshot().await;
    let hook_registry = registry.hooks().registry();

    let mut hooks = Vec::new();
    for event in hook_registry.registered_events().await {
        let count = hook_registry.handler_count(&event).await;
        hooks.push((event, count));
    }
    let mut services = registry.services().names();
    services.sort();

    let principal = Principal::new();
    CompositionSnapshot {
        routes: table.routes().iter().map(|r| r.prefix.clone()).collect(),
        middleware: table.middleware().len(),
        hooks,
        services,
        menu: registry
            .admin()
            .menu_for(&principal)
            .await
            .into_iter()
            .map(|m| m.label)
            .collect(),
        pages: registry
            .admin()
            .pages_for(&principal)
            .await
            .into_iter()
            .map(|p| p.path)
            .collect(),
    }
}

/// Registry counters
pub async fn stats(harness: &TestHarness) -> RegistryStats {
    harness.registry().stats().await
}
