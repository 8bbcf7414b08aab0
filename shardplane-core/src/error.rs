//! Error types for election operations.

use thiserror::Error;

/// Errors that can occur while constructing or running an elector.
///
/// The handler state machine only cares about one distinction: whether an
/// error is a permanent misconfiguration or a transient store condition that
/// a later campaign may recover from. [`ElectionError::is_retryable`] encodes
/// that split.
#[derive(Error, Debug)]
pub enum ElectionError {
    /// Namespace or lease parameters are invalid
    #[error("Namespace configuration error: {message}")]
    Config { message: String },

    /// The underlying consensus store could not be reached
    #[error("Election store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The election session was lost or revoked by the store
    #[error("Election session lost: {message}")]
    SessionLost { message: String },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result type for election operations
pub type ElectionResult<T> = std::result::Result<T, ElectionError>;

impl ElectionError {
    /// Creates a new configuration error with the given message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a new store-unavailable error with the given message.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new session-lost error with the given message.
    pub fn session_lost(message: impl Into<String>) -> Self {
        Self::SessionLost {
            message: message.into(),
        }
    }

    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a later campaign may succeed without operator intervention.
    ///
    /// Store outages and lost sessions are transient; configuration errors
    /// are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable { .. } | Self::SessionLost { .. }
        )
    }
}
