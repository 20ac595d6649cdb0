//! Configuration management for the Ratewarden CLI.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RatewardenError, Result};
use crate::ratelimit::LimiterConfig;

/// Prefix for environment variable overrides, e.g. `RATEWARDEN__LOG_LEVEL`.
const ENV_PREFIX: &str = "RATEWARDEN";

/// Main configuration for the Ratewarden CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    /// The limiter to run requests through
    pub limiter: LimiterConfig,

    /// Log filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WardenConfig {
    /// Load configuration from a YAML file, with `RATEWARDEN__*` environment
    /// variables taking precedence over file values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_file_with_env(path.as_ref(), ENV_PREFIX)
    }

    fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<Self> {
        // Environment values arrive as strings; parse them so numeric limiter
        // parameters can be overridden.
        let environment = config::Environment::with_prefix(env_prefix)
            .separator("__")
            .try_parsing(true);
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(environment)
            .build()
            .map_err(|e| RatewardenError::Config(e.to_string()))?;

        let config: WardenConfig = settings
            .try_deserialize()
            .map_err(|e| RatewardenError::Config(e.to_string()))?;
        config.limiter.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WardenConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatewardenError::Config(e.to_string()))?;
        config.limiter.validate()?;
        Ok(config)
    }
}
