//! Standard event names and the payload passed through hook handlers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known event names emitted by the host and the runtime itself.
///
/// Plugins are free to emit and subscribe to their own `namespace:event`
/// names; these constants only cover the events the host guarantees.
pub mod events {
    // ── Application ──
    /// Emitted once the host has finished booting the registry.
    pub const APP_INIT: &str = "app:init";
    /// Emitted when the host starts serving.
    pub const APP_READY: &str = "app:ready";
    /// Emitted at the start of `Registry::shutdown`.
    pub const APP_SHUTDOWN: &str = "app:shutdown";

    // ── Request ──
    /// Emitted before a request is dispatched.
    pub const REQUEST_START: &str = "request:start";
    /// Emitted after a request completes.
    pub const REQUEST_END: &str = "request:end";
    /// Emitted when a request fails.
    pub const REQUEST_ERROR: &str = "request:error";

    // ── Auth ──
    /// Emitted when a user logs in. Critical by default.
    pub const AUTH_LOGIN: &str = "auth:login";
    /// Emitted when a user logs out.
    pub const AUTH_LOGOUT: &str = "auth:logout";
    /// Emitted when a user registers. Critical by default.
    pub const AUTH_REGISTER: &str = "auth:register";

    // ── Content ──
    /// Emitted when content is created.
    pub const CONTENT_CREATE: &str = "content:create";
    /// Emitted when content is updated.
    pub const CONTENT_UPDATE: &str = "content:update";
    /// Emitted when content is deleted.
    pub const CONTENT_DELETE: &str = "content:delete";
    /// Emitted when content is published.
    pub const CONTENT_PUBLISH: &str = "content:publish";
    /// Emitted before content is persisted. Critical by default.
    pub const CONTENT_SAVE: &str = "content:save";

    // ── Media ──
    /// Emitted after a media upload.
    pub const MEDIA_UPLOAD: &str = "media:upload";
    /// Emitted after a media item is deleted.
    pub const MEDIA_DELETE: &str = "media:delete";
    /// Emitted when a media item is transformed.
    pub const MEDIA_TRANSFORM: &str = "media:transform";

    // ── Plugin lifecycle ──
    /// Emitted after a plugin is installed.
    pub const PLUGIN_INSTALL: &str = "plugin:install";
    /// Emitted after a plugin is uninstalled.
    pub const PLUGIN_UNINSTALL: &str = "plugin:uninstall";
    /// Emitted after a plugin is activated.
    pub const PLUGIN_ACTIVATE: &str = "plugin:activate";
    /// Emitted after a plugin is deactivated.
    pub const PLUGIN_DEACTIVATE: &str = "plugin:deactivate";

    // ── Admin ──
    /// Emitted while the admin menu is rendered.
    pub const ADMIN_MENU_RENDER: &str = "admin:menu:render";
    /// Emitted while an admin page is rendered.
    pub const ADMIN_PAGE_RENDER: &str = "admin:page:render";

    // ── Database ──
    /// Emitted when migrations run. Critical by default.
    pub const DB_MIGRATE: &str = "db:migrate";
    /// Emitted when seed data is loaded.
    pub const DB_SEED: &str = "db:seed";
}

/// Mutable payload threaded through every handler of one `emit` call.
///
/// Handlers may annotate the payload for downstream handlers and for the
/// emitter, or call [`HookPayload::cancel`] to stop the remaining dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookPayload {
    /// Event being dispatched. Set by the bus on `emit`.
    pub event: String,
    /// Arbitrary data keyed by string.
    pub data: HashMap<String, serde_json::Value>,
    /// The actor who triggered this event, if any.
    pub actor_id: Option<Uuid>,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    cancelled: bool,
}

impl HookPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self {
            event: String::new(),
            data: HashMap::new(),
            actor_id: None,
            timestamp: Utc::now(),
            cancelled: false,
        }
    }

    /// Creates a payload from a JSON object; non-object values land under `"value"`.
    pub fn from_value(value: serde_json::Value) -> Self {
        let mut payload = Self::new();
        match value {
            serde_json::Value::Object(map) => payload.data.extend(map),
            serde_json::Value::Null => {}
            other => {
                payload.data.insert("value".to_string(), other);
            }
        }
        payload
    }

    /// Sets the actor ID.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Inserts a data value.
    pub fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    /// Inserts a string value.
    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.with_data(key, serde_json::json!(value))
    }

    /// Inserts or replaces a value in place. Used by handlers to annotate.
    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Gets a data value by key.
    pub fn get_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string data value.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets an i64 data value.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Gets a bool data value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    /// Stops dispatch to the handlers after the current one.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Returns whether a handler cancelled the dispatch.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn reset_for(&mut self, event: &str) {
        self.event = event.to_string();
        self.cancelled = false;
    }
}

impl Default for HookPayload {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns whether an event name follows the `namespace:event` convention.
pub fn is_namespaced(event: &str) -> bool {
    match event.split_once(':') {
        Some((namespace, name)) => !namespace.is_empty() && !name.is_empty(),
        None => false,
    }
}
