//! Error types for tabnap
//!
//! Provides standardized error handling across the library.

use thiserror::Error;

use crate::host::TabId;

/// Errors that can occur in tabnap
#[derive(Debug, Error)]
pub enum TabnapError {
    /// Settings storage errors (reading or writing the backing file)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A host call (query, discard, close, activate) was rejected
    #[error("Host error: {0}")]
    Host(String),

    /// The tab no longer exists on the host
    #[error("Tab {0} not found")]
    TabNotFound(TabId),

    /// The scheduler task is gone or its channel is closed
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for tabnap operations
pub type TabnapResult<T> = Result<T, TabnapError>;
