//! Integration tests for route, middleware and admin composition.

use std::sync::{Arc, Mutex};

use loom_plugin_sdk::prelude::*;

use crate::helpers;

#[tokio::test]
async fn test_route_conflict_rolls_back_completely() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));

    harness
        .install_and_activate(helpers::route_plugin("cache", &["/admin/cache"]))
        .await
        .unwrap();
    let before = helpers::composition(&harness).await;

    let mut builder = PluginBuilder::new("redis-cache", "1.0.0");
    builder
        .add_route("/admin/cache/", helpers::echo("redis-cache"), RouteOptions::default())
        .unwrap()
        .add_route("/redis", helpers::echo("redis-cache"), RouteOptions::default())
        .unwrap()
        .add_hook(events::CONTENT_UPDATE, helpers::logging_hook(&log, "redis"), HookOptions::default())
        .unwrap()
        .add_service("redis-pool", ServiceProvider::instance(4usize), ServiceOptions::default())
        .unwrap()
        .add_menu_item("Redis", "/admin/redis", MenuItemOptions::default())
        .unwrap();
    registry.install(builder.build().unwrap()).await.unwrap();

    let err = registry.activate("redis-cache").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RouteConflict);
    assert_eq!(registry.state("redis-cache").await, PluginState::Installed);

    assert_eq!(helpers::composition(&harness).await, before);
    assert!(!registry.routes().snapshot().await.contains_plugin("redis-cache"));
    assert!(!registry.services().contains("redis-pool"));
    assert_eq!(harness.get("/redis").await.unwrap().status, 404);

    harness.emit(events::CONTENT_UPDATE, json!({})).await.unwrap();
    assert!(helpers::logged(&log).is_empty());
}

#[tokio::test]
async fn test_deactivate_withdraws_every_contribution() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));

    harness
        .install_and_activate(helpers::full_plugin("blog", &log))
        .await
        .unwrap();
    let baseline = helpers::composition(&harness).await;

    registry
        .install(helpers::full_plugin("forum", &log))
        .await
        .unwrap();
    registry.activate("forum").await.unwrap();

    let active = helpers::composition(&harness).await;
    assert_eq!(active.routes.len(), 2);
    assert_eq!(active.middleware, 2);
    assert_eq!(active.services, vec!["blog-service", "forum-service"]);
    assert_eq!(active.menu, vec!["blog", "forum"]);
    assert_eq!(active.pages, vec!["/admin/blog", "/admin/forum"]);

    registry.deactivate("forum").await.unwrap();
    assert_eq!(helpers::composition(&harness).await, baseline);

    harness.emit(events::CONTENT_UPDATE, json!({})).await.unwrap();
    assert_eq!(helpers::logged(&log), vec!["blog"]);
    assert_eq!(harness.get("/forum").await.unwrap().status, 404);
    assert_eq!(helpers::stats(&harness).await.inactive, 1);
}

#[tokio::test]
async fn test_longest_prefix_wins_and_ties_go_to_first_activated() {
    let harness = helpers::harness();

    harness
        .install_and_activate(helpers::route_plugin("content", &["/content"]))
        .await
        .unwrap();
    harness
        .install_and_activate(helpers::route_plugin("drafts", &["/content/drafts"]))
        .await
        .unwrap();

    let response = harness.get("/content/drafts/7").await.unwrap();
    assert_eq!(response.body["plugin"], json!("drafts"));
    let response = harness.get("/content/posts/7").await.unwrap();
    assert_eq!(response.body["plugin"], json!("content"));
    let response = harness.get("/contents").await.unwrap();
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_middleware_runs_global_then_scoped_by_priority() {
    let harness = helpers::harness();

    let trace = |tag: &'static str| {
        sync_middleware_fn(move |request| {
            let mut seen = request
                .extensions
                .get("trace")
                .and_then(|v| v.as_array().cloned())
                .unwrap_or_default();
            seen.push(json!(tag));
            request
                .extensions
                .insert("trace".to_string(), serde_json::Value::Array(seen));
            Ok(MiddlewareFlow::Next)
        })
    };

    let mut builder = PluginBuilder::new("analytics", "1.0.0");
    builder
        .add_route(
            "/stats",
            route_fn(|request: RouteRequest| async move {
                Ok(RouteResponse::ok(
                    request.extensions.get("trace").cloned().unwrap_or_default(),
                ))
            }),
            RouteOptions::default(),
        )
        .unwrap()
        .add_middleware("scoped-late", trace("scoped-late"), MiddlewareOptions::routes(["/stats"]).priority(1))
        .unwrap()
        .add_middleware("global-late", trace("global-late"), MiddlewareOptions::global().priority(20))
        .unwrap()
        .add_middleware("scoped-early", trace("scoped-early"), MiddlewareOptions::routes(["/stats"]).priority(0))
        .unwrap()
        .add_middleware("global-early", trace("global-early"), MiddlewareOptions::global().priority(5))
        .unwrap();
    harness
        .install_and_activate(builder.build().unwrap())
        .await
        .unwrap();

    let response = harness.get("/stats").await.unwrap();
    assert_eq!(
        response.body,
        json!(["global-early", "global-late", "scoped-early", "scoped-late"])
    );
}

#[tokio::test]
async fn test_protected_routes_require_principal_and_role() {
    let harness = helpers::harness();
    let registry = harness.registry();

    let mut builder = PluginBuilder::new("backup", "1.0.0");
    builder
        .add_route(
            "/backup",
            helpers::echo("backup"),
            RouteOptions {
                requires_auth: true,
                roles: vec!["admin".to_string()],
                ..RouteOptions::default()
            },
        )
        .unwrap();
    harness
        .install_and_activate(builder.build().unwrap())
        .await
        .unwrap();

    assert_eq!(harness.get("/backup").await.unwrap().status, 401);

    let editor = Principal::new().with_role("editor");
    let response = registry
        .dispatch(RouteRequest::get("/backup").with_principal(editor))
        .await
        .unwrap();
    assert_eq!(response.status, 403);

    let admin = Principal::new().with_role("admin");
    let response = registry
        .dispatch(RouteRequest::get("/backup").with_principal(admin))
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_admin_surface_filters_and_forgets_deactivated_plugins() {
    let harness = helpers::harness();
    let registry = harness.registry();

    let mut builder = PluginBuilder::new("cache", "1.0.0");
    builder
        .add_admin_page(
            "/admin/cache",
            "Cache",
            "CacheDashboard",
            AdminPageOptions {
                permissions: vec!["cache:manage".to_string()],
                ..AdminPageOptions::default()
            },
        )
        .unwrap()
        .add_menu_item(
            "Cache",
            "/admin/cache",
            MenuItemOptions {
                order: 20,
                permissions: vec!["cache:manage".to_string()],
                ..MenuItemOptions::default()
            },
        )
        .unwrap()
        .add_menu_item(
            "Help",
            "/admin/help",
            MenuItemOptions {
                order: 5,
                ..MenuItemOptions::default()
            },
        )
        .unwrap();
    harness
        .install_and_activate(builder.build().unwrap())
        .await
        .unwrap();

    let viewer = Principal::new().with_permissions(["posts:read"]);
    let manager = Principal::new().with_permissions(["cache:manage"]);

    let labels = |items: Vec<loom_plugin::descriptor::MenuItem>| {
        items.into_iter().map(|i| i.label).collect::<Vec<_>>()
    };
    assert_eq!(labels(registry.admin().menu_for(&viewer).await), vec!["Help"]);
    assert_eq!(
        labels(registry.admin().menu_for(&manager).await),
        vec!["Help", "Cache"]
    );
    assert!(registry.admin().pages_for(&viewer).await.is_empty());
    assert_eq!(registry.admin().pages_for(&manager).await.len(), 1);

    registry.deactivate("cache").await.unwrap();
    assert!(registry.admin().menu_for(&manager).await.is_empty());
    assert!(registry.admin().pages_for(&manager).await.is_empty());
}
