//! Error types for the sync client.

use std::path::PathBuf;
use std::time::Duration;

use jigsync_engine::{FailureClass, MutationId};

use crate::config::ConfigError;

/// Local persistence failed.
///
/// Fatal to the operation that hit it: a failed insert means the domain write
/// exists nowhere else.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] jigsync_engine::Error),

    #[error("Mutation not found: {0}")]
    NotFound(MutationId),

    #[error("Queue is owned by another process (lock held on {})", .0.display())]
    Locked(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A submit to the remote service failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Rejected by server ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Cannot build request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Failure class recorded on the entry.
    ///
    /// Both classes are retried under the default policy; the class only
    /// changes behavior when abandonment on rejection is enabled.
    pub fn class(&self) -> FailureClass {
        match self {
            RemoteError::Rejected { .. } | RemoteError::InvalidRequest(_) => {
                FailureClass::Rejected
            }
            RemoteError::Unreachable(_) | RemoteError::Timeout(_) | RemoteError::Server { .. } => {
                FailureClass::Transient
            }
        }
    }
}

/// Errors raised while assembling or running the sync agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
