//! Storage engine trait definition.

use crate::collection::{CollectionHandle, CollectionOptions};
use crate::error::StorageResult;

/// Options for opening an engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Reject writes and collection creation.
    pub read_only: bool,
    /// Maximum number of simultaneously opened collections (`None` = unlimited).
    pub max_collections: Option<u32>,
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    /// Sets the collection limit.
    #[must_use]
    pub const fn max_collections(mut self, max: u32) -> Self {
        self.max_collections = Some(max);
        self
    }
}

/// A single-writer key-value storage engine.
///
/// The engine owns exactly one mutable write-transaction slot. It does not
/// nest transactions and does not queue callers; that is the coordinator's
/// job. Every data operation runs inside the open write transaction.
///
/// # Invariants
///
/// - At most one write transaction is open at a time; `begin` while one is
///   open fails with [`crate::StorageError::TransactionActive`]
/// - `commit` publishes all writes of the open transaction, `abort`
///   discards them
/// - Collections opened inside an aborted transaction are forgotten, so
///   their handles become stale
/// - A handle is stale once its name maps to a different id, or to nothing
///
/// # Implementors
///
/// - [`super::InMemoryEngine`] - For testing and ephemeral stores
/// - [`super::FaultInjectingEngine`] - Wrapper that fails on demand
pub trait StorageEngine: Send {
    /// Opens the write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is closed or a transaction is open.
    fn begin(&mut self) -> StorageResult<()>;

    /// Commits the write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn commit(&mut self) -> StorageResult<()>;

    /// Aborts the write transaction, discarding its writes.
    ///
    /// # Errors
    ///
    /// Returns an error if no transaction is open.
    fn abort(&mut self) -> StorageResult<()>;

    /// Returns true while a write transaction is open.
    fn has_active_transaction(&self) -> bool;

    /// Opens (creating if needed) a collection. `None` names the default
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be opened or created.
    fn open_collection(
        &mut self,
        name: Option<&str>,
        options: CollectionOptions,
    ) -> StorageResult<CollectionHandle>;

    /// Returns true if the handle no longer refers to an opened collection.
    fn is_stale(&self, handle: &CollectionHandle) -> bool;

    /// Empties a collection; with `remove` also drops it.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn clear_collection(&mut self, handle: &CollectionHandle, remove: bool) -> StorageResult<()>;

    /// Stores a value under a key. For dupsort collections the value is
    /// added to the key's set.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction, for a stale handle or in
    /// read-only mode.
    fn put(&mut self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Returns the value for a key (the smallest one for dupsort collections).
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn get(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns how many values a key holds (0 if absent).
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn value_count(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<usize>;

    /// Returns true if the key exists.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn has(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool>;

    /// Returns true if the exact key/value pair exists.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn has_dup(&self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<bool>;

    /// Deletes a key with all its values. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction, for a stale handle or in
    /// read-only mode.
    fn delete(&mut self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool>;

    /// Deletes one key/value pair. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction, for a stale handle or in
    /// read-only mode.
    fn delete_dup(
        &mut self,
        handle: &CollectionHandle,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool>;

    /// Returns the smallest key.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn first_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the largest key.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn last_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the smallest key strictly greater than `key`.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn next_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the largest key strictly smaller than `key`.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn prev_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the smallest key greater than or equal to `key`.
    ///
    /// # Errors
    ///
    /// Returns an error outside a transaction or for a stale handle.
    fn lower_bound_key(
        &self,
        handle: &CollectionHandle,
        key: &[u8],
    ) -> StorageResult<Option<Vec<u8>>>;

    /// Closes the engine, discarding any open transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing engine resources fails.
    fn close(&mut self) -> StorageResult<()>;

    /// Returns true until `close` has been called.
    fn is_open(&self) -> bool;
}
