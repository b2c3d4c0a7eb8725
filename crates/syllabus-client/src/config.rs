//! Configuration for the Syllabus client.
//!
//! Settings are read from `syllabus.json` (camelCase keys). A missing file
//! yields the defaults; a present file is parsed and validated.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "syllabus.json";

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

/// Default request timeout in seconds.
const fn default_timeout_secs() -> u64 {
    30
}

fn default_token_env() -> String {
    "SYLLABUS_TOKEN".to_string()
}

/// Default capacity of the sync event channel.
const fn default_event_capacity() -> usize {
    64
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the course API; endpoint paths are appended to it.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Capacity of the sync event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `syllabus.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            SyncError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `syllabus.json` from a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigParseError` if the file cannot be read or
    /// parsed, and `SyncError::ConfigValidationError` if a value is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(SyncError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| SyncError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        let base = self.api_base_url.trim();
        if base.is_empty() {
            return Err(SyncError::config_validation(
                "apiBaseUrl must not be empty",
                "Set apiBaseUrl to the course API root, e.g. http://localhost:8080/api",
            ));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(SyncError::config_validation(
                format!("apiBaseUrl '{base}' is not an http(s) URL"),
                "Prefix apiBaseUrl with http:// or https://",
            ));
        }

        if self.timeout_secs == 0 {
            return Err(SyncError::config_validation(
                "timeoutSecs must be greater than 0",
                "Set timeoutSecs to at least 1 second in your syllabus.json",
            ));
        }

        if self.token_env.trim().is_empty() {
            return Err(SyncError::config_validation(
                "tokenEnv must not be empty",
                "Name the environment variable that holds the bearer token (default SYLLABUS_TOKEN)",
            ));
        }

        if self.event_capacity == 0 {
            return Err(SyncError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your syllabus.json",
            ));
        }

        Ok(())
    }

    /// The request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reads the bearer token from the environment, if set and non-empty.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.trim().is_empty())
    }
}
