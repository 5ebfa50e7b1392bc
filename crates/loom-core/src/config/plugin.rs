//! Plugin runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRuntimeConfig {
    /// Host version that plugin compatibility ranges are checked against.
    #[serde(default = "default_host_version")]
    pub host_version: String,
    /// Upper bound for a single lifecycle callback, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub callback_timeout_ms: u64,
    /// Upper bound for a single hook handler, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub hook_timeout_ms: u64,
    /// Events whose first handler failure aborts dispatch and reaches the emitter.
    #[serde(default = "default_critical_events")]
    pub critical_events: Vec<String>,
    /// Plugin names nobody may install.
    #[serde(default = "default_reserved_names")]
    pub reserved_names: Vec<String>,
    /// Reject middleware scoped to route patterns the plugin does not declare.
    #[serde(default)]
    pub strict_middleware_scopes: bool,
    /// Plugins the host activates at startup.
    #[serde(default)]
    pub autoload: Vec<String>,
}

impl PluginRuntimeConfig {
    /// Lifecycle callback timeout as a `Duration`.
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// Hook handler timeout as a `Duration`.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

impl Default for PluginRuntimeConfig {
    fn default() -> Self {
        Self {
            host_version: default_host_version(),
            callback_timeout_ms: default_timeout_ms(),
            hook_timeout_ms: default_timeout_ms(),
            critical_events: default_critical_events(),
            reserved_names: default_reserved_names(),
            strict_middleware_scopes: false,
            autoload: Vec::new(),
        }
    }
}

fn default_host_version() -> String {
    "1.0.0".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_critical_events() -> Vec<String> {
    ["auth:login", "auth:register", "content:save", "db:migrate"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_reserved_names() -> Vec<String> {
    vec!["core".to_string(), "system".to_string()]
}
