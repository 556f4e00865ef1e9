//! Error types for the Duet application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire Duet application.
///
/// The first group of variants mirrors the failure taxonomy of the
/// conversation engine (backend discovery, speech credentials, streaming,
/// fallback, recognition). The second group covers ambient concerns such as
/// storage and configuration.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum DuetError {
    /// No completion backend is reachable or the selected provider is unavailable
    #[error("Completion backend unavailable: {0}")]
    ConfigUnavailable(String),

    /// Speech credential fetch or refresh failed
    #[error("Authentication failure: {0}")]
    AuthFailure(String),

    /// Network or HTTP failure while a completion stream was open
    #[error("Stream transport error: {message}")]
    StreamTransport {
        status_code: Option<u16>,
        message: String,
    },

    /// The stream closed without producing any content
    #[error("Stream finished without content")]
    EmptyStream,

    /// The non-streaming retry failed as well
    #[error("Fallback request failed: {0}")]
    FallbackFailure(String),

    /// Speech recognition SDK or protocol failure
    #[error("Recognition error: {0}")]
    Recognition(String),

    /// Input rejected before any request was made
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another operation already holds the resource
    #[error("Busy: {0}")]
    Busy(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DuetError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a ConfigUnavailable error
    pub fn config_unavailable(message: impl Into<String>) -> Self {
        Self::ConfigUnavailable(message.into())
    }

    /// Creates an AuthFailure error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthFailure(message.into())
    }

    /// Creates a StreamTransport error
    pub fn transport(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self::StreamTransport {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a FallbackFailure error
    pub fn fallback(message: impl Into<String>) -> Self {
        Self::FallbackFailure(message.into())
    }

    /// Creates a Recognition error
    pub fn recognition(message: impl Into<String>) -> Self {
        Self::Recognition(message.into())
    }

    /// Creates an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this error means no backend can serve the request
    pub fn is_config_unavailable(&self) -> bool {
        matches!(self, Self::ConfigUnavailable(_))
    }

    /// Check if this is a credential error
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }

    /// Check if this is a streaming transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::StreamTransport { .. })
    }

    /// Check if this is a recognition error
    pub fn is_recognition(&self) -> bool {
        matches!(self, Self::Recognition(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for errors that should trigger the non-streaming fallback.
    ///
    /// Transport failures and empty streams are recoverable by retrying the
    /// same payload without streaming; everything else is not.
    pub fn triggers_fallback(&self) -> bool {
        matches!(self, Self::StreamTransport { .. } | Self::EmptyStream)
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for DuetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for DuetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for DuetError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for DuetError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for DuetError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A type alias for `Result<T, DuetError>`.
pub type Result<T> = std::result::Result<T, DuetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_classification() {
        assert!(DuetError::transport(Some(502), "bad gateway").triggers_fallback());
        assert!(DuetError::EmptyStream.triggers_fallback());
        assert!(!DuetError::fallback("still broken").triggers_fallback());
        assert!(!DuetError::config_unavailable("no provider").triggers_fallback());
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let err: DuetError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "history.json").into();
        match err {
            DuetError::Io { message } => assert!(message.contains("NotFound")),
            other => panic!("Expected Io error, got {other:?}"),
        }
    }
}
