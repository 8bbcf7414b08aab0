//! Error types for namespace manager operations.

use shardplane_core::ElectionError;
use thiserror::Error;

/// Result type for namespace manager operations
pub type ManagerResult<T> = std::result::Result<T, ManagerError>;

/// Errors that can occur while starting or stopping the namespace manager
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Two configured namespaces share a name
    #[error("Namespace {namespace} already running")]
    DuplicateNamespace { namespace: String },

    /// A namespace configuration failed validation
    #[error("Namespace {namespace} rejected: {source}")]
    InvalidNamespace {
        namespace: String,
        source: ElectionError,
    },

    /// The elector factory rejected a namespace during startup
    #[error("Elector initialization failed for namespace {namespace}: {source}")]
    ElectorInit {
        namespace: String,
        source: ElectionError,
    },

    /// Stop was called on a manager that is not running
    #[error("Manager was not running")]
    NotRunning,

    /// Start was called on a manager that is already running
    #[error("Manager is already running")]
    AlreadyRunning,
}
