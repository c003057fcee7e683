//! Runtime configuration: defaults, optional JSON file, `RELAYCHAT_*`
//! environment overrides, in that order.

use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use thiserror::Error;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file did not parse as JSON.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// An environment override held an invalid value.
    #[error("invalid value for {var}: {value}")]
    InvalidEnv {
        /// Offending variable name.
        var: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Top-level configuration for the relaychat server and sync clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Port for the HTTP/websocket server.
    pub server_port: u16,

    /// Logging level directive (e.g. `info`, `relaychat_server=debug`).
    pub log_level: String,

    /// Origin allowed by CORS; `None` allows any.
    pub cors_origin: Option<String>,

    /// Messages returned per history page.
    pub history_page_size: u16,

    /// Seconds an optimistic send may stay unconfirmed before failing.
    pub send_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            log_level: "info".to_string(),
            cors_origin: None,
            history_page_size: 10,
            send_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Resolves configuration from defaults, an optional JSON file, and
    /// `RELAYCHAT_*` environment variables (strongest last). An explicit
    /// `port_override` beats all of them.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or an
    /// environment override holds an unparsable value.
    pub fn load(config_path: Option<PathBuf>, port_override: Option<u16>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&content)
                    .map_err(|source| ConfigError::Parse { path, source })?
            }
            None => Self::default(),
        };

        if let Ok(port) = env::var("RELAYCHAT_SERVER_PORT") {
            config.server_port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: "RELAYCHAT_SERVER_PORT",
                    value: port,
                })?;
        }
        if let Ok(level) = env::var("RELAYCHAT_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Ok(origin) = env::var("RELAYCHAT_CORS_ORIGIN") {
            config.cors_origin = Some(origin);
        }

        if let Some(port) = port_override {
            config.server_port = port;
        }

        Ok(config)
    }
}
