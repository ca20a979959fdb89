//! Error types for chhart-mcp.
//!
//! Tool input problems never surface here as process failures: they become
//! error-flagged tool results. The types below cover configuration, token
//! decoding, session routing, and transport I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// An environment variable held an unusable value.
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// A share-link token could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The token is not base64 once the URL-safe substitutions are reversed.
    #[error("token is not valid base64")]
    InvalidBase64 {
        /// The underlying base64 error.
        #[source]
        source: base64::DecodeError,
    },

    /// The decoded bytes are not UTF-8 text.
    #[error("decoded token is not valid UTF-8")]
    InvalidUtf8 {
        /// The underlying UTF-8 error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Tool arguments were rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable reason, returned to the client verbatim.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Session routing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No live session has this identifier.
    #[error("Session not found: {id}")]
    NotFound {
        /// The identifier the client presented.
        id: String,
    },
}

/// Errors raised while carrying messages over a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer is gone; nothing more can be written.
    #[error("write to {channel} failed: peer disconnected")]
    WriteFailed {
        /// Which channel failed (for logs).
        channel: &'static str,
    },

    /// The connection has already started closing.
    #[error("connection is closed")]
    Closed,

    /// A lifecycle transition was requested from the wrong state.
    #[error("cannot move connection from {from} to {to}")]
    InvalidTransition {
        /// Current state.
        from: &'static str,
        /// Requested state.
        to: &'static str,
    },

    /// Underlying socket or stream I/O failed.
    #[error("transport I/O error")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn invalid_env_display() {
        let error = ConfigError::InvalidEnv {
            name: "PORT",
            value: "eighty".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid value for environment variable PORT: \"eighty\""
        );
    }

    #[test]
    fn session_not_found_names_the_id() {
        let error = SessionError::NotFound {
            id: "abc".to_string(),
        };
        assert_eq!(error.to_string(), "Session not found: abc");
    }

    #[test]
    fn validation_error_is_message_only() {
        let error = ValidationError::new("Flowchart content cannot be empty");
        assert_eq!(error.to_string(), "Flowchart content cannot be empty");
    }

    #[test]
    fn transition_error_display() {
        let error = TransportError::InvalidTransition {
            from: "closed",
            to: "active",
        };
        assert_eq!(error.to_string(), "cannot move connection from closed to active");
    }
}
