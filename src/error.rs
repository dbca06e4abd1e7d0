//! Error types for the Banana Operator

use thiserror::Error;

use crate::crd::Identity;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
///
/// Every variant is retryable from the controller's point of view: the
/// failing pass leaves the record untouched and the next pass re-fetches it.
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (store unavailable, transport failure, ...)
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Store was reachable but refused the request for a transient reason
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Optimistic concurrency check failed
    #[error("Version conflict on {identity}: expected resourceVersion {expected}")]
    VersionConflict { identity: Identity, expected: String },

    /// Store refused a malformed or forbidden write
    #[error("Store rejected write to {identity}: {reason}")]
    Rejected { identity: Identity, reason: String },

    /// Record vanished between read and write
    #[error("Record not found: {0}")]
    NotFound(Identity),

    /// Convergence or cleanup action failed
    #[error("Action failed: {0}")]
    Action(String),

    /// Convergence or cleanup action exceeded its deadline
    #[error("Action '{action}' timed out after {seconds}s")]
    ActionTimeout { action: &'static str, seconds: u64 },

    /// Action aborted by shutdown
    #[error("Action '{0}' cancelled")]
    Cancelled(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML rendering error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an action error
    pub fn action(msg: impl Into<String>) -> Self {
        Error::Action(msg.into())
    }

    /// Map a kube client error raised while writing `identity`
    pub fn from_write(identity: &Identity, expected: Option<&str>, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 409 => Error::VersionConflict {
                identity: identity.clone(),
                expected: expected.unwrap_or_default().to_string(),
            },
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(identity.clone()),
            other => Error::Kube(other),
        }
    }

    /// Whether another writer changed the record under us
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }

    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube(_) | Error::StoreUnavailable(_) => "store",
            Error::VersionConflict { .. } => "conflict",
            Error::NotFound(_) => "not_found",
            Error::Rejected { .. } => "rejected",
            Error::Action(_) => "action",
            Error::ActionTimeout { .. } => "timeout",
            Error::Cancelled(_) => "cancelled",
            Error::Config(_) => "config",
            Error::Serialization(_) | Error::Yaml(_) => "serialization",
            Error::Io(_) => "io",
        }
    }
}
