//! Plugin API: context and storage exposed to plugin code.

pub mod context;
pub mod storage;

pub use context::{PluginContext, PluginLogger};
pub use storage::{ConfigStore, MemoryConfigStore, MemoryStorage, NamespacedStorage, PluginStorage};
