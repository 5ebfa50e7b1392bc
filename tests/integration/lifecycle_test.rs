//! Integration tests for plugin lifecycle transitions.

use std::time::Duration;

use loom_plugin::LifecycleOp;
use loom_plugin::api::storage::ConfigStore;
use loom_plugin_sdk::prelude::*;
use loom_plugin_sdk::testing::{RecordingLifecycle, TestHarness};

use crate::helpers;

async fn drive_to(harness: &TestHarness, name: &str, state: PluginState) {
    let registry = harness.registry();
    if state == PluginState::Unregistered {
        return;
    }
    registry
        .install(helpers::route_plugin(name, &[format!("/{}", name).as_str()]))
        .await
        .unwrap();
    if matches!(state, PluginState::Active | PluginState::Inactive) {
        registry.activate(name).await.unwrap();
    }
    if state == PluginState::Inactive {
        registry.deactivate(name).await.unwrap();
    }
    assert_eq!(registry.state(name).await, state);
}

async fn attempt(harness: &TestHarness, name: &str, op: LifecycleOp) -> AppResult<()> {
    let registry = harness.registry();
    match op {
        LifecycleOp::Install => {
            registry
                .install(helpers::route_plugin(name, &[format!("/{}", name).as_str()]))
                .await
        }
        LifecycleOp::Activate => registry.activate(name).await,
        LifecycleOp::Deactivate => registry.deactivate(name).await,
        LifecycleOp::Uninstall => registry.uninstall(name).await,
    }
}

#[tokio::test]
async fn test_only_the_six_edges_succeed() {
    let mut legal = 0;

    for from in PluginState::ALL {
        for op in LifecycleOp::ALL {
            let harness = helpers::harness();
            let name = "subject";
            drive_to(&harness, name, from).await;

            let outcome = attempt(&harness, name, op).await;
            let after = harness.registry().state(name).await;

            match from.transition(op) {
                Some(to) => {
                    assert!(outcome.is_ok(), "{} from {} failed: {:?}", op, from, outcome);
                    assert_eq!(after, to, "{} from {}", op, from);
                    legal += 1;
                }
                None => {
                    let err = outcome.expect_err("illegal transition accepted");
                    let expected = match (from, op) {
                        (PluginState::Unregistered, _) => ErrorKind::NotFound,
                        (_, LifecycleOp::Install) => ErrorKind::DuplicateName,
                        _ => ErrorKind::InvalidTransition,
                    };
                    assert_eq!(err.kind, expected, "{} from {}", op, from);
                    assert_eq!(after, from, "{} from {} changed state", op, from);
                }
            }
        }
    }

    assert_eq!(legal, 6);
}

#[tokio::test]
async fn test_uninstall_active_cache_is_rejected() {
    let harness = helpers::harness();
    let registry = harness.registry();

    registry
        .install(helpers::route_plugin("cache", &["/admin/cache"]))
        .await
        .unwrap();
    registry.activate("cache").await.unwrap();

    let err = registry.uninstall("cache").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTransition);
    assert_eq!(registry.state("cache").await, PluginState::Active);

    let response = harness.get("/admin/cache").await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_duplicate_install_leaves_entry_unchanged() {
    let harness = helpers::harness();
    let registry = harness.registry();

    registry
        .install(helpers::route_plugin("seo", &["/seo"]))
        .await
        .unwrap();
    registry.configure("seo", json!({ "title": "Home" })).await.unwrap();
    let before = registry.entry("seo").await.unwrap();

    let err = registry
        .install(helpers::route_plugin("seo", &["/seo-v2"]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::DuplicateName);

    let after = registry.entry("seo").await.unwrap();
    assert_eq!(after.state, before.state);
    assert_eq!(after.persisted_config, before.persisted_config);
    assert_eq!(after.last_updated_at, before.last_updated_at);
    assert_eq!(after.descriptor.routes()[0].path_prefix, "/seo");
}

#[tokio::test]
async fn test_config_survives_reactivation_and_dies_with_uninstall() {
    let harness = helpers::harness();
    let registry = harness.registry();

    registry
        .install(helpers::route_plugin("gallery", &["/gallery"]))
        .await
        .unwrap();
    registry.activate("gallery").await.unwrap();
    registry.configure("gallery", json!({ "x": 1 })).await.unwrap();
    registry.deactivate("gallery").await.unwrap();
    registry.activate("gallery").await.unwrap();

    assert_eq!(registry.state("gallery").await, PluginState::Active);
    assert_eq!(registry.get_config("gallery").await.unwrap()["x"], json!(1));

    registry.deactivate("gallery").await.unwrap();
    registry.uninstall("gallery").await.unwrap();
    assert_eq!(harness.config_store().len(), 0);

    registry
        .install(helpers::route_plugin("gallery", &["/gallery"]))
        .await
        .unwrap();
    assert!(registry.get_config("gallery").await.unwrap().get("x").is_none());
}

#[tokio::test]
async fn test_failed_activate_keeps_state_and_allows_retry() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let recorder = RecordingLifecycle::new();

    registry
        .install(helpers::recorded_plugin("newsletter", &recorder))
        .await
        .unwrap();
    recorder.fail_on("activate").await;

    let err = registry.activate("newsletter").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::LifecycleCallback);
    assert_eq!(registry.state("newsletter").await, PluginState::Installed);
    let entry = registry.entry("newsletter").await.unwrap();
    assert!(entry.last_error.is_some());

    recorder.succeed().await;
    registry.activate("newsletter").await.unwrap();
    assert_eq!(registry.state("newsletter").await, PluginState::Active);
    assert!(registry.entry("newsletter").await.unwrap().last_error.is_none());
    assert_eq!(
        recorder.callbacks().await,
        vec!["install", "activate", "activate"]
    );
}

#[tokio::test]
async fn test_timed_out_activate_rolls_back() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let recorder = RecordingLifecycle::new().with_delay(Duration::from_millis(200));

    registry
        .install_within(
            helpers::recorded_plugin("slow", &recorder),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    let err = registry
        .activate_within("slow", Duration::from_millis(20))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::LifecycleCallback);
    assert_eq!(registry.state("slow").await, PluginState::Installed);
}

#[tokio::test]
async fn test_failed_deactivate_keeps_plugin_active() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let recorder = RecordingLifecycle::new();

    harness
        .install_and_activate(helpers::recorded_plugin("stubborn", &recorder))
        .await
        .unwrap();
    recorder.fail_on("deactivate").await;

    let err = registry.deactivate("stubborn").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::LifecycleCallback);
    assert_eq!(registry.state("stubborn").await, PluginState::Active);
}

#[tokio::test]
async fn test_concurrent_activate_runs_once() {
    let harness = helpers::harness();
    let registry = harness.registry().clone();
    let recorder = RecordingLifecycle::new().with_delay(Duration::from_millis(20));

    registry
        .install(helpers::recorded_plugin("racer", &recorder))
        .await
        .unwrap();

    let first = tokio::spawn({
        let registry = registry.clone();
        async move { registry.activate("racer").await }
    });
    let second = tokio::spawn({
        let registry = registry.clone();
        async move { registry.activate("racer").await }
    });
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(successes, 1);
    let failure = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert_eq!(failure.kind, ErrorKind::InvalidTransition);

    let activations = recorder
        .callbacks()
        .await
        .into_iter()
        .filter(|c| c == "activate")
        .count();
    assert_eq!(activations, 1);
    assert_eq!(registry.state("racer").await, PluginState::Active);
}

#[tokio::test]
async fn test_dependencies_gate_install_activate_and_teardown() {
    let harness = helpers::harness();
    let registry = harness.registry();

    let mut builder = PluginBuilder::new("comments-moderation", "1.0.0");
    builder.dependency("comments", "^1.0").unwrap();
    let dependent = builder.build().unwrap();

    let err = registry.install(dependent.clone()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
    assert_eq!(
        registry.state("comments-moderation").await,
        PluginState::Unregistered
    );

    registry
        .install(helpers::route_plugin("comments", &["/comments"]))
        .await
        .unwrap();
    registry.install(dependent).await.unwrap();

    let err = registry.activate("comments-moderation").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);

    let report = registry.activate_all().await.unwrap();
    assert_eq!(report.activated, vec!["comments", "comments-moderation"]);

    let err = registry.deactivate("comments").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);

    registry.deactivate("comments-moderation").await.unwrap();
    registry.deactivate("comments").await.unwrap();
    let err = registry.uninstall("comments").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Dependency);
}

#[tokio::test]
async fn test_shutdown_deactivates_in_reverse_order() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let first = RecordingLifecycle::new();
    let second = RecordingLifecycle::new();

    harness
        .install_and_activate(helpers::recorded_plugin("first", &first))
        .await
        .unwrap();
    harness
        .install_and_activate(helpers::recorded_plugin("second", &second))
        .await
        .unwrap();

    registry.shutdown().await.unwrap();

    assert_eq!(registry.state("first").await, PluginState::Inactive);
    assert_eq!(registry.state("second").await, PluginState::Inactive);
    let second_done = second.calls().await.len();
    assert_eq!(second_done, 3);

    let err = registry.activate("first").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
}

fn dependent_plugin(name: &str, dependency: &str, recorder: &RecordingLifecycle) -> Arc<PluginDescriptor> {
    let mut builder = PluginBuilder::new(name, "1.0.0");
    builder.dependency(dependency, "^1.0").unwrap();
    builder.lifecycle(recorder.clone()).unwrap();
    builder.build().unwrap()
}

#[tokio::test]
async fn test_deactivate_refused_when_dependent_activates_during_callback() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let email = RecordingLifecycle::new().with_delay(Duration::from_millis(150));
    let newsletter = RecordingLifecycle::new().with_delay(Duration::from_millis(60));

    harness
        .install_and_activate(helpers::recorded_plugin("email", &email))
        .await
        .unwrap();
    registry
        .install(dependent_plugin("newsletter", "email", &newsletter))
        .await
        .unwrap();

    let (activated, deactivated) = tokio::join!(registry.activate("newsletter"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.deactivate("email").await
    });

    assert!(activated.is_ok(), "{:?}", activated);
    assert_eq!(deactivated.unwrap_err().kind, ErrorKind::Dependency);
    assert_eq!(registry.state("newsletter").await, PluginState::Active);
    assert_eq!(registry.state("email").await, PluginState::Active);
    assert_eq!(email.callbacks().await, vec!["install", "activate", "deactivate"]);
}

#[tokio::test]
async fn test_uninstall_refused_when_dependent_installs_during_callback() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let email = RecordingLifecycle::new().with_delay(Duration::from_millis(150));
    let newsletter = RecordingLifecycle::new().with_delay(Duration::from_millis(60));

    registry
        .install(helpers::recorded_plugin("email", &email))
        .await
        .unwrap();

    let (installed, uninstalled) = tokio::join!(
        registry.install(dependent_plugin("newsletter", "email", &newsletter)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.uninstall("email").await
        }
    );

    assert!(installed.is_ok(), "{:?}", installed);
    assert_eq!(uninstalled.unwrap_err().kind, ErrorKind::Dependency);
    assert_eq!(registry.state("email").await, PluginState::Installed);
    assert_eq!(registry.state("newsletter").await, PluginState::Installed);
    assert!(harness.config_store().load("email").await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_install_keeps_imported_config() {
    let harness = helpers::harness();
    let registry = harness.registry();
    let newsletter = RecordingLifecycle::new().with_delay(Duration::from_millis(60));

    registry
        .install(helpers::route_plugin("email", &["/email"]))
        .await
        .unwrap();
    let mut records = std::collections::BTreeMap::new();
    records.insert(
        "newsletter".to_string(),
        json!({"sender": "news@example.com"}).as_object().cloned().unwrap(),
    );
    assert_eq!(registry.import_config(records).await.unwrap(), 1);

    let (installed, uninstalled) = tokio::join!(
        registry.install(dependent_plugin("newsletter", "email", &newsletter)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.uninstall("email").await
        }
    );

    assert!(uninstalled.is_ok(), "{:?}", uninstalled);
    assert_eq!(installed.unwrap_err().kind, ErrorKind::Dependency);
    assert_eq!(registry.state("newsletter").await, PluginState::Unregistered);
    let staged = harness.config_store().load("newsletter").await.unwrap().unwrap();
    assert_eq!(staged["sender"], "news@example.com");
}
