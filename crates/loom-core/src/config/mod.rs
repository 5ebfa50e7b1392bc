//! Runtime configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! an optional `config/default` file, an environment overlay and
//! `LOOM__*` environment variables. Each sub-module is one section.

pub mod logging;
pub mod plugin;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::plugin::PluginRuntimeConfig;

use crate::error::AppError;

/// Root runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Plugin runtime settings.
    #[serde(default)]
    pub plugins: PluginRuntimeConfig,
}

impl RuntimeConfig {
    /// Load configuration for the given environment name.
    ///
    /// Merges `config/default`, `config/{env}` and environment variables
    /// prefixed with `LOOM__` (e.g. `LOOM__PLUGINS__HOST_VERSION`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("LOOM")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("plugins.critical_events")
                    .with_list_parse_key("plugins.reserved_names")
                    .with_list_parse_key("plugins.autoload")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let runtime: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        tracing::debug!(
            env = %env,
            host_version = %runtime.plugins.host_version,
            "Runtime configuration loaded"
        );

        Ok(runtime)
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
