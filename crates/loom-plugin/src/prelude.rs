//! Prelude for convenient imports.

pub use async_trait::async_trait;

pub use crate::api::context::{PluginContext, PluginLogger};
pub use crate::api::storage::PluginStorage;
pub use crate::builder::{
    AdminPageOptions, HookOptions, MenuItemOptions, Metadata, MiddlewareOptions, PluginBuilder,
    RouteOptions, ServiceOptions,
};
pub use crate::descriptor::{ConfigMap, MiddlewareScope, PluginDescriptor};
pub use crate::hooks::definitions::{HookPayload, events};
pub use crate::hooks::registry::HookHandler;
pub use crate::lifecycle::{PluginLifecycle, PluginState};
pub use crate::principal::Principal;
pub use crate::routes::handler::{
    Middleware, MiddlewareFlow, RouteHandler, RouteRequest, RouteResponse,
};
pub use crate::services::{ServiceProvider, ServiceResolver};
pub use crate::traits::{hook_fn, middleware_fn, route_fn, sync_hook_fn, sync_middleware_fn};

pub use crate::{config_map, hook_payload};
