//! Error types for spacekv
//!
//! Provides a unified error type for all client operations.
//!
//! Conditional failures (`condput` mismatch, missing records) are not errors:
//! they surface as `false` / `None` results.

use thiserror::Error;

use crate::protocol::Status;

/// Result type alias using SpaceError
pub type Result<T> = std::result::Result<T, SpaceError>;

/// Unified error type for spacekv operations
#[derive(Debug, Error)]
pub enum SpaceError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Validation Errors (raised before any request is sent)
    // -------------------------------------------------------------------------
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown space: {0}")]
    UnknownSpace(String),

    #[error("Unknown attribute '{attribute}' in space '{space}'")]
    UnknownAttribute { space: String, attribute: String },

    #[error("Wrong type for attribute '{attribute}': {message}")]
    WrongType { attribute: String, message: String },

    #[error("Attribute '{0}' specified more than once")]
    DuplicateAttribute(String),

    #[error("No pending operations")]
    NonePending,

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Remote Errors
    // -------------------------------------------------------------------------
    #[error("Server error ({status:?}): {message}")]
    Server { status: Status, message: String },

    #[error("Operation timed out")]
    Timeout,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SpaceError {
    /// True for errors raised synchronously while building an operation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SpaceError::Validation(_)
                | SpaceError::UnknownSpace(_)
                | SpaceError::UnknownAttribute { .. }
                | SpaceError::WrongType { .. }
                | SpaceError::DuplicateAttribute(_)
                | SpaceError::NonePending
        )
    }

    /// True when the connection itself failed
    pub fn is_transport(&self) -> bool {
        matches!(self, SpaceError::Transport(_) | SpaceError::Io(_))
    }

    /// Build a server error from a failure status
    pub fn server(status: Status, message: impl Into<String>) -> Self {
        SpaceError::Server {
            status,
            message: message.into(),
        }
    }
}

// A resolved future hands the same failure to every `wait()`, so errors must
// be cloneable. `io::Error` is not, so it is rebuilt from its kind and text.
impl Clone for SpaceError {
    fn clone(&self) -> Self {
        match self {
            SpaceError::Io(e) => SpaceError::Io(std::io::Error::new(e.kind(), e.to_string())),
            SpaceError::Validation(m) => SpaceError::Validation(m.clone()),
            SpaceError::UnknownSpace(s) => SpaceError::UnknownSpace(s.clone()),
            SpaceError::UnknownAttribute { space, attribute } => SpaceError::UnknownAttribute {
                space: space.clone(),
                attribute: attribute.clone(),
            },
            SpaceError::WrongType { attribute, message } => SpaceError::WrongType {
                attribute: attribute.clone(),
                message: message.clone(),
            },
            SpaceError::DuplicateAttribute(a) => SpaceError::DuplicateAttribute(a.clone()),
            SpaceError::NonePending => SpaceError::NonePending,
            SpaceError::Transport(m) => SpaceError::Transport(m.clone()),
            SpaceError::Protocol(m) => SpaceError::Protocol(m.clone()),
            SpaceError::Serialization(m) => SpaceError::Serialization(m.clone()),
            SpaceError::Server { status, message } => SpaceError::Server {
                status: *status,
                message: message.clone(),
            },
            SpaceError::Timeout => SpaceError::Timeout,
            SpaceError::Config(m) => SpaceError::Config(m.clone()),
        }
    }
}

impl From<bincode::Error> for SpaceError {
    fn from(e: bincode::Error) -> Self {
        SpaceError::Serialization(e.to_string())
    }
}
