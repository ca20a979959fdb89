//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::chart::DEFAULT_ORIGIN;
use crate::error::ConfigError;

/// Longest accepted heartbeat interval in seconds.
const MAX_HEARTBEAT_SECS: u64 = 300;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Origin that share links point at.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP transport settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            base_url: default_base_url(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid base_url '{}'. Must start with http:// or https://",
                    self.base_url
                ),
            });
        }

        let heartbeat = self.server.heartbeat_interval_secs;
        if heartbeat == 0 || heartbeat > MAX_HEARTBEAT_SECS {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid heartbeat_interval_secs {heartbeat}. Must be between 1 and {MAX_HEARTBEAT_SECS}"
                ),
            });
        }

        Ok(())
    }
}

fn default_base_url() -> String {
    DEFAULT_ORIGIN.to_string()
}

/// How the streamable HTTP transport tracks clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Every request is handled independently.
    #[default]
    Stateless,
    /// `initialize` issues a session id that later requests must present.
    Stateful,
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port. Overridden by `PORT` and `--port`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between keep-alive comments on event streams.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Session handling for the streamable HTTP transport.
    #[serde(default)]
    pub session_mode: SessionMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            session_mode: SessionMode::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_heartbeat_interval() -> u64 {
    15
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
