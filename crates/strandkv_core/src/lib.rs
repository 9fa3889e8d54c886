//! # strandkv Core
//!
//! Transaction coordination for strandkv.
//!
//! The storage engine offers exactly one write transaction at a time. This
//! crate lets many call sites share it:
//! - Nested transactions counted onto one engine transaction, with shared
//!   commit/abort fate
//! - Generation-checked transaction handles that reject stale use
//! - A FIFO queue that runs asynchronous transaction requests one by one
//!
//! ## Example
//!
//! ```rust
//! use strandkv_core::{CoreError, Database};
//!
//! let db = Database::open_in_memory().unwrap();
//!
//! let result: Result<(), CoreError> = db.run_transaction(|txn| {
//!     let users = txn.collection("users")?;
//!     txn.put(&users, b"bob", b"guest")?;
//!
//!     // Nested call: joins the open transaction.
//!     txn.database().run_transaction(|inner| {
//!         let users = inner.collection("users")?;
//!         inner.put(&users, b"carol", b"guest")
//!     })?;
//!
//!     // Aborts both writes.
//!     Err(CoreError::aborted("rolled back"))
//! });
//! assert!(result.is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod database;
mod error;
mod queue;
mod transaction;
mod types;

pub use config::{Config, DEFAULT_WORKER_THREAD_NAME};
pub use context::Transaction;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use queue::{Deferred, DrainQueue, Job};
pub use transaction::{TransactionCoordinator, TransactionHandle};
pub use types::Generation;

// Re-export storage types used in the public API
pub use strandkv_storage::{CollectionHandle, CollectionId, CollectionOptions, StorageError};
