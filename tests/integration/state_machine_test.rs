//! Property test: random lifecycle operations against a model of the
//! state machine.

use std::collections::HashMap;

use proptest::prelude::*;

use loom_plugin::LifecycleOp;
use loom_plugin_sdk::prelude::*;

use crate::helpers;

const PLUGINS: [&str; 3] = ["alpha", "beta", "gamma"];

fn op_strategy() -> impl Strategy<Value = LifecycleOp> {
    prop::sample::select(LifecycleOp::ALL.to_vec())
}

fn run_ops(ops: Vec<(usize, LifecycleOp)>) -> Result<(), TestCaseError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    runtime.block_on(async move {
        let harness = helpers::harness();
        let registry = harness.registry();
        let mut model: HashMap<&str, PluginState> = PLUGINS
            .iter()
            .map(|name| (*name, PluginState::Unregistered))
            .collect();

        for (index, op) in ops {
            let name = PLUGINS[index];
            let prefix = format!("/{}", name);
            let outcome = match op {
                LifecycleOp::Install => {
                    registry
                        .install(helpers::route_plugin(name, &[prefix.as_str()]))
                        .await
                }
                LifecycleOp::Activate => registry.activate(name).await,
                LifecycleOp::Deactivate => registry.deactivate(name).await,
                LifecycleOp::Uninstall => registry.uninstall(name).await,
            };

            let expected = model[name].transition(op);
            prop_assert_eq!(outcome.is_ok(), expected.is_some(), "{} {}", op, name);
            if let Some(next) = expected {
                model.insert(name, next);
            }

            for plugin in PLUGINS {
                prop_assert_eq!(registry.state(plugin).await, model[plugin]);
            }

            let table = registry.routes().snapshot().await;
            for plugin in PLUGINS {
                let mounted = table.contains_plugin(plugin);
                prop_assert_eq!(mounted, model[plugin] == PluginState::Active);
            }

            let stats = registry.stats().await;
            let active = model.values().filter(|s| **s == PluginState::Active).count();
            prop_assert_eq!(stats.active, active);
            prop_assert_eq!(stats.routes, active);
        }
        Ok(())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_registry_follows_lifecycle_model(
        ops in prop::collection::vec((0..PLUGINS.len(), op_strategy()), 1..24)
    ) {
        run_ops(ops)?;
    }
}
