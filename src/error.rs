//! Error types for the FOCAL rules server
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.
//!
//! Messages only ever carry the client-supplied relative path or identifier.
//! Absolute paths and raw OS errors stay in the logs.

use thiserror::Error;

/// Main error type for FOCAL operations
#[derive(Error, Debug)]
pub enum FocalError {
    /// Path escapes the workspace root or contains disallowed segments
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unknown prompt name, unknown resource URI or missing file
    #[error("Not found: {0}")]
    NotFound(String),

    /// Destination already exists, or folder is not empty
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource URI does not use the `focal:///` scheme
    #[error("Invalid resource URI: {0}")]
    InvalidUri(String),

    /// Unrecognized JSON-RPC method or tool name
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Missing or malformed arguments
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Request arrived on a connection before `initialize`
    #[error("Server not initialized")]
    NotInitialized,

    /// Missing or wrong shared secret
    #[error("Unauthorized")]
    Unauthorized,

    /// Filesystem call exceeded the configured I/O timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl FocalError {
    /// Message safe to hand to a client
    ///
    /// Internal failures collapse to a fixed string so no absolute path or
    /// OS error text leaks out.
    pub fn client_message(&self) -> String {
        match self {
            FocalError::Io(_)
            | FocalError::Config(_)
            | FocalError::Serialization(_)
            | FocalError::Other(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for FOCAL operations
pub type Result<T> = std::result::Result<T, FocalError>;

/// Convert anyhow::Error to FocalError
impl From<anyhow::Error> for FocalError {
    fn from(err: anyhow::Error) -> Self {
        FocalError::Other(err.to_string())
    }
}
