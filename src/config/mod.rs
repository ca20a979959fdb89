//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! 1. Path given as the `CONFIG_FILE` CLI argument (must exist)
//! 2. Default location, used only if present:
//!    - **Linux/macOS:** `~/.chhart-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.chhart-mcp\config.json`
//!
//! Without either, built-in defaults apply. The `PORT` environment variable
//! overrides `server.port`.

mod settings;

pub use settings::{Config, LoggingConfig, ServerConfig, SessionMode};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable selecting the HTTP listen port.
pub const PORT_ENV: &str = "PORT";

/// Returns the default configuration directory.
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".chhart-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and validates the configuration.
///
/// An explicit `path` must exist. With `None`, the default location is read
/// if it exists and defaults are used otherwise.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly named file cannot be found or read
/// - The JSON is malformed or has unknown fields
/// - Validation fails
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => read_config_file(&p)?,
            None => Config::default(),
        },
    };

    config.validate()?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Resolves the listen port: `cli` beats `PORT`, which beats the config file.
///
/// `env_port` is the raw value of the `PORT` variable, if set.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] if `env_port` is set but not a port
/// number.
pub fn resolve_port(
    cli: Option<u16>,
    env_port: Option<&str>,
    config: &ServerConfig,
) -> Result<u16, ConfigError> {
    if let Some(port) = cli {
        return Ok(port);
    }

    match env_port.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidEnv {
            name: PORT_ENV,
            value: raw.to_string(),
        }),
        None => Ok(config.port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn loads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "server": { "port": 4100 } }"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.base_url, "https://chhart.app");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "base_url": "chhart.app" }"#).unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn port_precedence() {
        let server = ServerConfig::default();
        assert_eq!(resolve_port(None, None, &server).unwrap(), 3000);
        assert_eq!(resolve_port(None, Some("8080"), &server).unwrap(), 8080);
        assert_eq!(resolve_port(Some(9000), Some("8080"), &server).unwrap(), 9000);
        assert_eq!(resolve_port(None, Some("  "), &server).unwrap(), 3000);
    }

    #[test]
    fn bad_port_env_is_rejected() {
        let err = resolve_port(None, Some("eighty"), &ServerConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "PORT", .. }));

        tokio_test::assert_err!(resolve_port(None, Some("70000"), &ServerConfig::default()));
        tokio_test::assert_ok!(resolve_port(Some(70), Some("70000"), &ServerConfig::default()));
    }
}
