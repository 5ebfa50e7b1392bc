//! Integration tests for hook dispatch through plugins.

use std::sync::{Arc, Mutex};

use loom_plugin_sdk::prelude::*;

use crate::helpers;

fn hook_plugin(name: &str, event: &str, handlers: Vec<(i32, Arc<dyn HookHandler>)>) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new(name, "1.0.0");
    for (priority, handler) in handlers {
        builder
            .add_hook(event, handler, HookOptions::priority(priority))
            .unwrap();
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_handlers_run_in_priority_order_despite_failure() {
    let harness = helpers::harness();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));

    let failing = {
        let log = log.clone();
        sync_hook_fn(move |_payload| {
            log.lock().unwrap().push("5".to_string());
            Err(AppError::internal("thumbnail service down"))
        })
    };
    harness
        .install_and_activate(hook_plugin(
            "media-tools",
            events::MEDIA_UPLOAD,
            vec![
                (5, failing),
                (1, helpers::logging_hook(&log, "1")),
                (10, helpers::logging_hook(&log, "10")),
            ],
        ))
        .await
        .unwrap();

    let mut payload = hook_payload!({ "file" => json!("cat.png") });
    let result = harness
        .registry()
        .hooks()
        .emit(events::MEDIA_UPLOAD, &mut payload)
        .await
        .unwrap();

    assert_eq!(helpers::logged(&log), vec!["1", "5", "10"]);
    assert_eq!(result.invoked, 3);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].plugin, "media-tools");
    assert_eq!(result.failures[0].error.kind, ErrorKind::HookExecution);
}

#[tokio::test]
async fn test_critical_event_failure_reaches_the_emitter() {
    let harness = helpers::harness();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));

    harness
        .install_and_activate(hook_plugin(
            "spam-guard",
            events::AUTH_REGISTER,
            vec![
                (1, sync_hook_fn(|_| Err(AppError::validation("disposable email")))),
                (2, helpers::logging_hook(&log, "welcome-mail")),
            ],
        ))
        .await
        .unwrap();

    let err = harness
        .emit(events::AUTH_REGISTER, json!({ "email": "a@tempmail.test" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::HookExecution);
    assert!(helpers::logged(&log).is_empty());
}

#[tokio::test]
async fn test_handlers_annotate_a_shared_payload() {
    let harness = helpers::harness();

    harness
        .install_and_activate(hook_plugin(
            "seo",
            events::CONTENT_PUBLISH,
            vec![(
                1,
                sync_hook_fn(|payload| {
                    let slug = payload
                        .get_string("title")
                        .unwrap_or_default()
                        .to_lowercase()
                        .replace(' ', "-");
                    payload.set("slug", json!(slug));
                    Ok(())
                }),
            )],
        ))
        .await
        .unwrap();
    harness
        .install_and_activate(hook_plugin(
            "sitemap",
            events::CONTENT_PUBLISH,
            vec![(
                2,
                sync_hook_fn(|payload| {
                    let url = format!("/posts/{}", payload.get_string("slug").unwrap_or_default());
                    payload.set("sitemap_url", json!(url));
                    Ok(())
                }),
            )],
        ))
        .await
        .unwrap();

    let payload = harness
        .emit(events::CONTENT_PUBLISH, json!({ "title": "Hello World" }))
        .await
        .unwrap();
    assert_eq!(payload.get_string("sitemap_url"), Some("/posts/hello-world"));
}

#[tokio::test]
async fn test_lifecycle_events_reach_host_handlers() {
    let harness = helpers::harness();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));
    let hooks = harness.registry().hooks();

    for event in [
        events::PLUGIN_INSTALL,
        events::PLUGIN_ACTIVATE,
        events::PLUGIN_DEACTIVATE,
        events::PLUGIN_UNINSTALL,
    ] {
        let log = log.clone();
        let event_name = event.to_string();
        hooks
            .on(
                event,
                sync_hook_fn(move |payload| {
                    let plugin = payload.get_string("plugin").unwrap_or_default();
                    log.lock()
                        .unwrap()
                        .push(format!("{}:{}", event_name, plugin));
                    Ok(())
                }),
                1,
            )
            .await;
    }

    let registry = harness.registry();
    harness
        .install_and_activate(helpers::route_plugin("polls", &["/polls"]))
        .await
        .unwrap();
    registry.deactivate("polls").await.unwrap();
    registry.uninstall("polls").await.unwrap();

    assert_eq!(
        helpers::logged(&log),
        vec![
            "plugin:install:polls",
            "plugin:activate:polls",
            "plugin:deactivate:polls",
            "plugin:uninstall:polls",
        ]
    );
}

#[tokio::test]
async fn test_handler_removed_mid_dispatch_is_skipped() {
    let harness = helpers::harness();
    let log: helpers::CallLog = Arc::new(Mutex::new(Vec::new()));
    let hook_registry = harness.registry().hooks().registry().clone();

    let remover = hook_fn(move |_payload| {
        let hook_registry = hook_registry.clone();
        Box::pin(async move {
            hook_registry.unregister_plugin("audit-trail").await;
            Ok(())
        })
    });
    harness.registry().hooks().on(events::CONTENT_DELETE, remover, 1).await;
    harness
        .install_and_activate(hook_plugin(
            "audit-trail",
            events::CONTENT_DELETE,
            vec![(5, helpers::logging_hook(&log, "audit"))],
        ))
        .await
        .unwrap();

    let mut payload = HookPayload::new();
    let result = harness
        .registry()
        .hooks()
        .emit(events::CONTENT_DELETE, &mut payload)
        .await
        .unwrap();

    assert_eq!(result.invoked, 1);
    assert_eq!(result.skipped, 1);
    assert!(helpers::logged(&log).is_empty());
}
