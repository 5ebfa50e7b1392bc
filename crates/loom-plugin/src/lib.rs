//! # loom-plugin
//!
//! Plugin runtime for Loom. Provides:
//!
//! - Manifest validation and a fluent builder producing immutable descriptors
//! - A registry driving the install/activate/deactivate/uninstall state machine
//! - A priority-ordered hook bus with per-event failure policy
//! - Route and middleware composition with conflict detection
//! - An admin surface merging menu items and pages
//! - A service container with lazy singletons and cycle detection

pub mod admin;
pub mod api;
pub mod builder;
pub mod descriptor;
pub mod hooks;
pub mod lifecycle;
pub mod macros;
pub mod manifest;
pub mod prelude;
pub mod principal;
pub mod registry;
pub mod routes;
pub mod services;
pub mod traits;

pub use admin::{AdminSurface, AdminSurfaceRegistry, MenuNode};
pub use api::context::{PluginContext, PluginLogger};
pub use builder::PluginBuilder;
pub use descriptor::{ConfigMap, PluginDescriptor};
pub use hooks::definitions::HookPayload;
pub use hooks::dispatcher::{DispatchResult, HookBus};
pub use hooks::registry::{HookHandler, HookRegistry};
pub use lifecycle::{LifecycleManager, LifecycleOp, PluginLifecycle, PluginState};
pub use manifest::{Manifest, ManifestValidator};
pub use principal::Principal;
pub use registry::{PluginStatus, Registry, RegistryEntry, RegistryStats};
pub use routes::{RouteComposer, RouteRequest, RouteResponse, RouteTable};
pub use services::{ServiceContainer, ServiceProvider};
