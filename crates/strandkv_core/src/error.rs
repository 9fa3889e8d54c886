//! Error types for strandkv core.

use crate::types::Generation;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in strandkv core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage engine error, passed through unchanged.
    #[error("storage error: {0}")]
    Storage(#[from] strandkv_storage::StorageError),

    /// A transaction handle was used after it finished, or after the
    /// transaction it belonged to ended.
    #[error("stale transaction: handle {handle}, current {current}")]
    StaleTransaction {
        /// Generation captured by the handle.
        handle: Generation,
        /// Generation of the coordinator at the time of use.
        current: Generation,
    },

    /// Database is closed.
    #[error("database has been closed")]
    DatabaseClosed,

    /// A submitted action could not produce a result.
    #[error("invalid action: {message}")]
    InvalidAction {
        /// What went wrong with the action.
        message: String,
    },

    /// Transaction was aborted by the caller.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },

    /// I/O error (e.g. the drain worker thread could not be spawned).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CoreError {
    /// Creates a stale transaction error.
    pub fn stale(handle: Generation, current: Generation) -> Self {
        Self::StaleTransaction { handle, current }
    }

    /// Creates an invalid action error.
    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::InvalidAction {
            message: message.into(),
        }
    }

    /// Creates a transaction aborted error.
    ///
    /// Returning this from an action rolls back the current level.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Returns true for misuse of the coordinator (stale handles, closed
    /// database). Retrying such a call cannot succeed.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::StaleTransaction { .. } | Self::DatabaseClosed)
    }
}
