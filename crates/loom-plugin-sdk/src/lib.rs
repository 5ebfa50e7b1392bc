//! # loom-plugin-sdk
//!
//! SDK for developing Loom plugins.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use loom_plugin_sdk::prelude::*;
//!
//! pub fn plugin() -> AppResult<Arc<PluginDescriptor>> {
//!     let mut builder = PluginBuilder::new("reading-time", "1.0.0");
//!     builder
//!         .metadata(Metadata { license: Some("MIT".into()), ..Metadata::default() })?
//!         .add_hook(
//!             events::CONTENT_SAVE,
//!             sync_hook_fn(|payload| {
//!                 let words = payload.get_string("body").map(|b| b.split_whitespace().count());
//!                 payload.set("reading_minutes", json!(words.unwrap_or(0) / 200));
//!                 Ok(())
//!             }),
//!             HookOptions::default(),
//!         )?
//!         .on_activate(|ctx| async move {
//!             ctx.logger.info("reading time estimates enabled");
//!             Ok(())
//!         })?;
//!     builder.build()
//! }
//! ```
//!
//! Plugins are exercised in tests through [`testing::TestHarness`].

pub mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    pub use loom_core::{AppError, AppResult, ErrorKind};
    pub use loom_plugin::prelude::*;
    pub use serde_json::json;
}
