//! Transaction context passed to actions.

use crate::database::Database;
use crate::error::CoreResult;
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use crate::types::Generation;
use strandkv_storage::{CollectionHandle, CollectionOptions};

/// The transaction an action runs in.
///
/// Every operation first checks that this level is still usable and fails
/// with [`CoreError::StaleTransaction`](crate::CoreError::StaleTransaction)
/// once it was committed or aborted, or once the transaction it joined has
/// ended.
///
/// The action normally leaves commit and abort to
/// [`Database::run_transaction`]: returning `Ok` commits this level,
/// returning `Err` aborts it. Calling [`commit`](Self::commit) or
/// [`abort`](Self::abort) explicitly finishes the level early.
pub struct Transaction<'a> {
    db: &'a Database,
    handle: TransactionHandle,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(db: &'a Database, handle: TransactionHandle) -> Self {
        Self { db, handle }
    }

    pub(crate) fn into_handle(self) -> TransactionHandle {
        self.handle
    }

    /// Runs `f` on the coordinator after checking this level is current.
    fn with_coordinator<R>(
        &self,
        f: impl FnOnce(&mut TransactionCoordinator) -> CoreResult<R>,
    ) -> CoreResult<R> {
        self.db.with_coordinator(|coordinator| {
            self.handle.ensure_current(coordinator)?;
            f(coordinator)
        })
    }

    /// Returns the generation of the transaction this level joined.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.handle.generation()
    }

    /// Returns true once this level was committed or aborted.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.handle.finished()
    }

    /// Returns the database, for nested calls.
    #[must_use]
    pub fn database(&self) -> &'a Database {
        self.db
    }

    /// Commits this level now.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if the level already finished, or the
    /// engine error of the final commit.
    pub fn commit(&mut self) -> CoreResult<()> {
        let handle = &mut self.handle;
        self.db
            .with_coordinator(|coordinator| handle.commit(coordinator))
    }

    /// Aborts this level now.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if the level already finished, or the
    /// engine error of the final abort.
    pub fn abort(&mut self) -> CoreResult<()> {
        let handle = &mut self.handle;
        self.db.with_coordinator(|coordinator| handle.abort(coordinator))
    }

    /// Returns the named collection, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn collection(&self, name: &str) -> CoreResult<CollectionHandle> {
        self.collection_with(name, CollectionOptions::new())
    }

    /// Returns the named collection, creating it with `options` if needed.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn collection_with(
        &self,
        name: &str,
        options: CollectionOptions,
    ) -> CoreResult<CollectionHandle> {
        self.with_coordinator(|coordinator| coordinator.collection(Some(name), options))
    }

    /// Returns the default (unnamed) collection.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn default_collection(&self) -> CoreResult<CollectionHandle> {
        self.with_coordinator(|coordinator| {
            coordinator.collection(None, CollectionOptions::new())
        })
    }

    /// Empties a collection; with `remove` also drops it.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn clear_collection(&self, collection: &CollectionHandle, remove: bool) -> CoreResult<()> {
        let generation = self.handle.generation();
        self.with_coordinator(|coordinator| {
            coordinator.clear_collection(generation, collection, remove)
        })
    }

    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn put(&self, collection: &CollectionHandle, key: &[u8], value: &[u8]) -> CoreResult<()> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine_mut().put(collection, key, value)?)
        })
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn get(&self, collection: &CollectionHandle, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().get(collection, key)?))
    }

    /// Returns how many values `key` holds.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn value_count(&self, collection: &CollectionHandle, key: &[u8]) -> CoreResult<usize> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine().value_count(collection, key)?)
        })
    }

    /// Returns true if `key` exists.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn has(&self, collection: &CollectionHandle, key: &[u8]) -> CoreResult<bool> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().has(collection, key)?))
    }

    /// Returns true if the exact `key`/`value` pair exists.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn has_dup(
        &self,
        collection: &CollectionHandle,
        key: &[u8],
        value: &[u8],
    ) -> CoreResult<bool> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine().has_dup(collection, key, value)?)
        })
    }

    /// Deletes `key` with all its values. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn delete(&self, collection: &CollectionHandle, key: &[u8]) -> CoreResult<bool> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine_mut().delete(collection, key)?)
        })
    }

    /// Deletes one `key`/`value` pair. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn delete_dup(
        &self,
        collection: &CollectionHandle,
        key: &[u8],
        value: &[u8],
    ) -> CoreResult<bool> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine_mut().delete_dup(collection, key, value)?)
        })
    }

    /// Returns the smallest key.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn first_key(&self, collection: &CollectionHandle) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().first_key(collection)?))
    }

    /// Returns the largest key.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn last_key(&self, collection: &CollectionHandle) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().last_key(collection)?))
    }

    /// Returns the smallest key after `key`.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn next_key(
        &self,
        collection: &CollectionHandle,
        key: &[u8],
    ) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().next_key(collection, key)?))
    }

    /// Returns the largest key before `key`.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn prev_key(
        &self,
        collection: &CollectionHandle,
        key: &[u8],
    ) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| Ok(coordinator.engine().prev_key(collection, key)?))
    }

    /// Returns the smallest key not less than `key`.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` or the engine error.
    pub fn lower_bound_key(
        &self,
        collection: &CollectionHandle,
        key: &[u8],
    ) -> CoreResult<Option<Vec<u8>>> {
        self.with_coordinator(|coordinator| {
            Ok(coordinator.engine().lower_bound_key(collection, key)?)
        })
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("generation", &self.handle.generation())
            .field("finished", &self.handle.finished())
            .finish_non_exhaustive()
    }
}
