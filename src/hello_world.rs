//! Built-in demo plugin: a greeting route, a request-id middleware, a
//! content hook, a service and an admin page.

use std::sync::atomic::{AtomicU64, Ordering};

use loom_plugin_sdk::prelude::*;

/// Plugin name.
pub const NAME: &str = "hello-world";

/// Greets callers of the demo route.
#[derive(Debug)]
pub struct Greeter {
    greeting: String,
}

impl Greeter {
    /// Greets `who`.
    pub fn greet(&self, who: &str) -> String {
        format!("{}, {}!", self.greeting, who)
    }
}

/// Builds the plugin descriptor.
pub fn plugin() -> AppResult<Arc<PluginDescriptor>> {
    let request_ids = Arc::new(AtomicU64::new(1));
    let greeter = Arc::new(Greeter {
        greeting: "Hello".to_string(),
    });
    let route_greeter = greeter.clone();

    let mut builder = PluginBuilder::new(NAME, env!("CARGO_PKG_VERSION"));
    builder
        .metadata(Metadata {
            description: Some("Greets visitors and stamps request ids".to_string()),
            author: Some("Loom Team".to_string()),
            license: Some("MIT".to_string()),
            compatibility: Some("^1.0".to_string()),
        })?
        .default_config(json!({ "greeting": "Hello" }))?
        .add_route(
            "/hello",
            route_fn(move |request: RouteRequest| {
                let greeter = route_greeter.clone();
                async move {
                    let who = request
                        .path
                        .strip_prefix("/hello/")
                        .filter(|s| !s.is_empty())
                        .unwrap_or("world");
                    Ok(RouteResponse::ok(json!({
                        "message": greeter.greet(who),
                        "request_id": request.extensions.get("request_id").cloned(),
                    })))
                }
            }),
            RouteOptions {
                description: Some("Greeting endpoint".to_string()),
                ..RouteOptions::default()
            },
        )?
        .add_middleware(
            "request-id",
            sync_middleware_fn(move |request| {
                let id = request_ids.fetch_add(1, Ordering::Relaxed);
                request.extensions.insert("request_id".to_string(), json!(id));
                Ok(MiddlewareFlow::Next)
            }),
            MiddlewareOptions::global().priority(1),
        )?
        .add_hook(
            events::CONTENT_SAVE,
            sync_hook_fn(|payload| {
                if payload.get_string("title").is_some_and(str::is_empty) {
                    return Err(AppError::validation("title must not be empty"));
                }
                payload.set("reviewed_by", json!(NAME));
                Ok(())
            }),
            HookOptions::default(),
        )?
        .add_service(
            "greeter",
            ServiceProvider::Instance(greeter),
            ServiceOptions::default(),
        )?
        .add_admin_page(
            "/admin/hello",
            "Hello World",
            "HelloWorldSettings",
            AdminPageOptions {
                permissions: vec!["hello:manage".to_string()],
                ..AdminPageOptions::default()
            },
        )?
        .add_menu_item(
            "Hello World",
            "/admin/hello",
            MenuItemOptions {
                icon: Some("hand-wave".to_string()),
                permissions: vec!["hello:manage".to_string()],
                ..MenuItemOptions::default()
            },
        )?
        .on_activate(|ctx| async move {
            let greeting = ctx.config_as::<String>("greeting")?.unwrap_or_default();
            ctx.logger.info(&format!("Greeting with '{}'", greeting));
            Ok(())
        })?
        .on_configure(|ctx, config| async move {
            match config.get("greeting") {
                Some(serde_json::Value::String(g)) if !g.is_empty() => {
                    ctx.logger.info(&format!("Greeting changed to '{}'", g));
                    Ok(())
                }
                _ => Err(AppError::validation("greeting must be a non-empty string")),
            }
        })?;

    builder.build()
}
