//! Helper configuration.
//!
//! Values are layered: built-in defaults, then an optional file named by
//! `GIT_REMOTE_IPFS_CONFIG`, then `GIT_REMOTE_IPFS_*` environment variables.

use crate::error::SetupError;
use crate::logging::LogFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_ENV: &str = "GIT_REMOTE_IPFS_CONFIG";

/// Prefix of environment overrides, e.g. `GIT_REMOTE_IPFS_API_URL`.
pub const ENV_PREFIX: &str = "GIT_REMOTE_IPFS";

/// Runtime configuration of the helper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Base URL of the content store API.
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
            timeout_secs: 120,
            log_level: "warn".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl HelperConfig {
    /// Loads the configuration from the process environment.
    pub fn load() -> Result<Self, SetupError> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref(), None)
    }

    /// Loads the configuration from `file` and an explicit environment.
    ///
    /// With `env` set to `None` the process environment is used.
    pub fn load_from(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SetupError> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("api_url", defaults.api_url)?
            .set_default("timeout_secs", defaults.timeout_secs)?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_format", defaults.log_format.as_str())?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(SetupError::Config(format!(
                "api_url must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(SetupError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SetupError::Config(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
