//! Error types for the subscription store.

use thiserror::Error;
use tidedb_storage::StorageError;

/// Result type for subscription-store operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in subscription-store operations.
///
/// Sync errors are cloneable because the same error may be delivered to
/// several outstanding notification handles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The storage backend failed; propagated unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// API misuse: mutating a non-draft set or driving an illegal state
    /// transition.
    #[error("logic error: {0}")]
    Logic(String),

    /// No subscription set exists with the requested version.
    #[error("no subscription set with version {version}")]
    KeyNotFound {
        /// The version that was looked up.
        version: i64,
    },

    /// The server rejected the subscription set; carries the server's
    /// error string.
    #[error("subscription set errored: {message}")]
    SubscriptionError {
        /// The server-reported error.
        message: String,
    },

    /// The subscription set was superseded by a newer version before
    /// reaching the awaited state.
    #[error("subscription set version {version} was superseded")]
    Superseded {
        /// The superseded version.
        version: i64,
    },

    /// The operation was abandoned, e.g. because the store is shutting down.
    #[error("operation cancelled: {message}")]
    Cancelled {
        /// Why the operation was abandoned.
        message: String,
    },

    /// A persisted state ordinal is outside the known range.
    #[error("invalid persisted subscription state ordinal {ordinal}")]
    InvalidState {
        /// The unknown ordinal read from storage.
        ordinal: i64,
    },
}

impl SyncError {
    /// Creates a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// Creates a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }
}
