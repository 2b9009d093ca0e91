//! # Configuration
//!
//! Client settings, resolved in three layers:
//!
//! 1. TOML file (`--config`, or `structdb.toml` in the working directory if
//!    present)
//! 2. Environment: `STRUCTDB_URL`, `STRUCTDB_TOKEN`
//! 3. CLI flags: `--url`, `--token`
//!
//! Later layers win.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use structdb_core::StructDbError;

/// Config file looked up when no path is given.
pub const DEFAULT_CONFIG_PATH: &str = "structdb.toml";

/// Public database server.
pub const DEFAULT_URL: &str = "https://atomistictools.org";

/// Request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const URL_ENV: &str = "STRUCTDB_URL";
pub const TOKEN_ENV: &str = "STRUCTDB_TOKEN";

/// Resolved client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Server base URL.
    pub url: String,
    /// Access token sent with every query.
    pub token: String,
    pub timeout_secs: u64,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            token: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept_invalid_certs: false,
        }
    }
}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, StructDbError> {
        toml::from_str(text).map_err(|e| StructDbError::Config(format!("invalid config: {e}")))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, StructDbError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StructDbError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// File layer plus environment layer.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn resolve(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StructDbError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::load(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(env);
        Ok(config)
    }

    /// Override from environment variables; empty values are ignored.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| env(name).filter(|v| !v.is_empty());
        if let Some(url) = non_empty(URL_ENV) {
            self.url = url;
        }
        if let Some(token) = non_empty(TOKEN_ENV) {
            self.token = token;
        }
    }

    /// Override from command-line flags.
    pub fn apply_overrides(&mut self, url: Option<&str>, token: Option<&str>) {
        if let Some(url) = url {
            self.url = url.to_string();
        }
        if let Some(token) = token {
            self.token = token.to_string();
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// TESTS
// =============================================================================
