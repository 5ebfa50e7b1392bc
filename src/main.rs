//! Loom Host: demo host for the plugin runtime.
//!
//! Loads configuration, installs the built-in plugins, activates the
//! configured ones, exercises the composed routes and hooks, then shuts
//! the registry down.

mod hello_world;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use loom_core::config::RuntimeConfig;
use loom_core::error::AppError;
use loom_plugin::hooks::definitions::events;
use loom_plugin::routes::handler::RouteRequest;
use loom_plugin::services::ServiceProvider;
use loom_plugin::traits::sync_hook_fn;
use loom_plugin::{PluginDescriptor, Principal, Registry};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Host error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from files and environment
fn load_configuration() -> Result<RuntimeConfig, AppError> {
    let env = std::env::var("LOOM_ENV").unwrap_or_else(|_| "development".to_string());
    RuntimeConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &RuntimeConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Plugins compiled into the host.
fn builtin_plugins() -> Result<Vec<Arc<PluginDescriptor>>, AppError> {
    Ok(vec![hello_world::plugin()?])
}

/// Main host run function
async fn run(config: RuntimeConfig) -> Result<(), AppError> {
    tracing::info!("Starting Loom host v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Registry ─────────────────────────────────────────
    let autoload = config.plugins.autoload.clone();
    let registry = Registry::new(config.plugins)?;

    // ── Step 2: Host services and hooks ──────────────────────────
    registry.services().register_global(
        "host-info",
        ServiceProvider::instance(format!("loom-host/{}", env!("CARGO_PKG_VERSION"))),
        true,
    )?;
    registry
        .hooks()
        .on(
            events::PLUGIN_ACTIVATE,
            sync_hook_fn(|payload| {
                tracing::info!(
                    plugin = payload.get_string("plugin").unwrap_or_default(),
                    "Host observed plugin activation"
                );
                Ok(())
            }),
            100,
        )
        .await;

    // ── Step 3: Install and activate plugins ─────────────────────
    for descriptor in builtin_plugins()? {
        let name = descriptor.name().to_string();
        if let Err(e) = registry.install(descriptor).await {
            tracing::error!(plugin = %name, error = %e, "Plugin install failed");
        }
    }

    if autoload.is_empty() {
        let report = registry.activate_all().await?;
        tracing::info!(
            activated = report.activated.len(),
            failed = report.failed.len(),
            "Activated installed plugins"
        );
    } else {
        for name in &autoload {
            if let Err(e) = registry.activate(name).await {
                tracing::error!(plugin = %name, error = %e, "Plugin activation failed");
            }
        }
    }

    // ── Step 4: Exercise the composition ─────────────────────────
    let response = registry.dispatch(RouteRequest::get("/hello/loom")).await?;
    tracing::info!(status = response.status, body = %response.body, "GET /hello/loom");

    let payload = registry
        .hooks()
        .emit_value(
            events::CONTENT_SAVE,
            serde_json::json!({ "title": "Welcome", "slug": "welcome" }),
        )
        .await?;
    tracing::info!(data = ?payload.data, "content:save dispatched");

    let admin = Principal::new().with_permissions(["hello:manage"]);
    let menu = registry.admin().menu_tree(&admin).await;
    tracing::info!(menu = %serde_json::to_string(&menu)?, "Admin menu");

    for status in registry.list().await {
        tracing::info!(
            plugin = %status.name,
            version = %status.version,
            state = %status.state,
            "Plugin status"
        );
    }
    tracing::info!(stats = ?registry.stats().await, "Registry stats");

    // ── Step 5: Shutdown ─────────────────────────────────────────
    registry.shutdown().await?;
    tracing::info!("Loom host stopped");
    Ok(())
}
