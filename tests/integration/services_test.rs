//! Integration tests for plugin-contributed services.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use loom_plugin_sdk::prelude::*;

use crate::helpers;

#[derive(Debug)]
struct SearchIndex {
    generation: usize,
    locale: Arc<String>,
}

fn search_plugin(builds: Arc<AtomicUsize>) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new("search", "1.0.0");
    builder
        .add_service(
            "search-index",
            ServiceProvider::factory(move |resolver| {
                let locale = resolver.resolve_as::<String>("site-locale")?;
                Ok(SearchIndex {
                    generation: builds.fetch_add(1, Ordering::SeqCst) + 1,
                    locale,
                })
            }),
            ServiceOptions::default(),
        )
        .unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn test_plugin_singleton_lives_for_one_activation() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let builds = Arc::new(AtomicUsize::new(0));

    registry
        .services()
        .register_global("site-locale", ServiceProvider::instance("en-GB".to_string()), true)
        .unwrap();
    harness
        .install_and_activate(search_plugin(builds.clone()))
        .await
        .unwrap();

    let first = registry.services().resolve_as::<SearchIndex>("search-index").unwrap();
    let again = registry.services().resolve_as::<SearchIndex>("search-index").unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(first.locale.as_str(), "en-GB");

    registry.deactivate("search").await.unwrap();
    let err = registry.services().resolve("search-index").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(registry.services().contains("site-locale"));

    registry.activate("search").await.unwrap();
    let rebuilt = registry.services().resolve_as::<SearchIndex>("search-index").unwrap();
    assert_eq!(first.generation, 1);
    assert_eq!(rebuilt.generation, 2);
}

#[tokio::test]
async fn test_transient_service_is_built_per_resolve() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();

    let mut builder = PluginBuilder::new("uploads", "1.0.0");
    builder
        .add_service(
            "upload-ticket",
            ServiceProvider::factory(move |_| Ok(counter.fetch_add(1, Ordering::SeqCst))),
            ServiceOptions::transient(),
        )
        .unwrap();
    harness
        .install_and_activate(builder.build().unwrap())
        .await
        .unwrap();

    let a = registry.services().resolve_as::<usize>("upload-ticket").unwrap();
    let b = registry.services().resolve_as::<usize>("upload-ticket").unwrap();
    assert_ne!(*a, *b);
    assert_eq!(builds.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_factories_resolving_each_other_are_detected() {
    let harness = helpers::harness();
    let registry = harness.registry();

    let provider = |name: &str, needs: &'static str| {
        let mut builder = PluginBuilder::new(name, "1.0.0");
        builder
            .add_service(
                &format!("{}-service", name),
                ServiceProvider::factory(move |resolver| {
                    resolver.resolve(needs)?;
                    Ok(())
                }),
                ServiceOptions::default(),
            )
            .unwrap();
        builder.build().unwrap()
    };

    harness
        .install_and_activate(provider("orders", "billing-service"))
        .await
        .unwrap();
    harness
        .install_and_activate(provider("billing", "orders-service"))
        .await
        .unwrap();

    let err = registry.services().resolve("orders-service").unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);
    assert!(
        err.message
            .contains("orders-service -> billing-service -> orders-service")
    );
}

#[tokio::test]
async fn test_service_name_collision_is_refused_at_install() {
    let harness = helpers::harness();
    let registry = harness.registry();

    let mailer = |name: &str| {
        let mut builder = PluginBuilder::new(name, "1.0.0");
        builder
            .add_service("mailer", ServiceProvider::instance(name.to_string()), ServiceOptions::default())
            .unwrap();
        builder.build().unwrap()
    };

    harness.install_and_activate(mailer("smtp")).await.unwrap();
    let err = registry.install(mailer("sendgrid")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateName);
    assert_eq!(registry.state("sendgrid").await, PluginState::Unregistered);

    let owner = registry.services().resolve_as::<String>("mailer").unwrap();
    assert_eq!(owner.as_str(), "smtp");
}

#[tokio::test]
async fn test_plugin_context_reaches_global_services() {
    let harness = helpers::harness();
    let registry = harness.registry();

    registry
        .services()
        .register_global("site-name", ServiceProvider::instance("Loom Blog".to_string()), true)
        .unwrap();

    let mut builder = PluginBuilder::new("footer", "1.0.0");
    builder
        .on_activate(|ctx| async move {
            let site = ctx.services.resolve_as::<String>("site-name")?;
            ctx.storage.set("footer", json!(format!("© {}", site))).await
        })
        .unwrap();
    harness
        .install_and_activate(builder.build().unwrap())
        .await
        .unwrap();

    assert_eq!(
        harness.storage().get("plugin:footer:footer").await.unwrap(),
        Some(json!("© Loom Blog"))
    );
}
