//! Hook system: handler registry, event bus and the standard event names.

pub mod definitions;
pub mod dispatcher;
pub mod registry;

pub use definitions::{HookPayload, events};
pub use dispatcher::{DispatchResult, HOST_PLUGIN, HookBus, HookFailure};
pub use registry::{HookEntry, HookHandler, HookId, HookRegistry};
