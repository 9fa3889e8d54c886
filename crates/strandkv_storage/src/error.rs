//! Error types for storage engine operations.

use thiserror::Error;

/// Result type for storage engine operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage engine operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The engine is closed.
    #[error("storage engine is closed")]
    Closed,

    /// A data operation or commit/abort was issued without a write transaction.
    #[error("no transaction started")]
    NoTransaction,

    /// A second write transaction was requested while one is open.
    #[error("multiple parallel transactions")]
    TransactionActive,

    /// A write was attempted on a read-only engine.
    #[error("storage engine is read-only")]
    ReadOnly,

    /// The named collection does not exist and could not be created.
    #[error("collection not found: {}", display_name(.name))]
    NotFound {
        /// Name of the collection (`None` for the default collection).
        name: Option<String>,
    },

    /// The collection exists with different options than requested.
    #[error("collection {} exists with incompatible options", display_name(.name))]
    IncompatibleCollection {
        /// Name of the collection.
        name: Option<String>,
    },

    /// Opening another collection would exceed the configured limit.
    #[error("collection limit reached: at most {max} collections")]
    CollectionLimit {
        /// The configured maximum.
        max: u32,
    },

    /// A collection handle was used after its collection was dropped or
    /// its creating transaction was aborted.
    #[error("stale collection handle: {}", display_name(.name))]
    StaleCollection {
        /// Name of the collection.
        name: Option<String>,
    },

    /// A failure armed through a fault plan.
    #[error("injected failure in {operation}")]
    Injected {
        /// The engine operation that failed.
        operation: &'static str,
    },
}

fn display_name(name: &Option<String>) -> &str {
    name.as_deref().unwrap_or("<default>")
}

impl StorageError {
    /// Creates a not-found error.
    pub fn not_found(name: Option<&str>) -> Self {
        Self::NotFound {
            name: name.map(str::to_owned),
        }
    }

    /// Creates a stale collection error.
    pub fn stale_collection(name: Option<&str>) -> Self {
        Self::StaleCollection {
            name: name.map(str::to_owned),
        }
    }
}
