//! Nested transaction coordinator.

use crate::error::{CoreError, CoreResult};
use crate::types::Generation;
use std::collections::HashMap;
use strandkv_storage::{CollectionHandle, CollectionOptions, StorageEngine};
use tracing::{debug, trace, warn};

/// Multiplexes nested logical transactions onto the engine's single write
/// transaction.
///
/// The coordinator keeps a nesting depth. The first `begin` at depth zero
/// opens the engine transaction; deeper begins only count. Commit and abort
/// count back down, and whichever call brings the depth to zero decides
/// whether the engine commits or aborts the work of every level.
///
/// ## Generations
///
/// Every `begin` returns the current [`Generation`]. Commit and abort must
/// present it; the generation advances each time the depth returns to zero,
/// so a generation from an earlier transaction is rejected with
/// [`CoreError::StaleTransaction`].
///
/// ## Collection cache
///
/// Collection handles are cached by name. A cached handle is checked against
/// the engine on every lookup and reopened once it went stale.
pub struct TransactionCoordinator {
    /// The single-writer engine.
    engine: Box<dyn StorageEngine>,
    /// Number of logical transactions sharing the engine transaction.
    depth: u32,
    /// Generation of the current (or next) outermost transaction.
    generation: Generation,
    /// Opened collections by name (`None` = default collection).
    collections: HashMap<Option<String>, CollectionHandle>,
    /// Set once by `close`.
    closed: bool,
}

impl TransactionCoordinator {
    /// Creates a coordinator owning `engine`.
    pub fn new(engine: Box<dyn StorageEngine>) -> Self {
        Self {
            engine,
            depth: 0,
            generation: Generation::FIRST,
            collections: HashMap::new(),
            closed: false,
        }
    }

    /// Joins the current transaction, opening the engine transaction when
    /// none is open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`close`](Self::close), or the engine
    /// error if the engine transaction cannot be opened. The depth is
    /// unchanged on error.
    pub fn begin(&mut self) -> CoreResult<Generation> {
        if self.closed {
            return Err(CoreError::DatabaseClosed);
        }
        if self.depth == 0 {
            self.engine.begin()?;
            debug!(generation = %self.generation, "engine transaction opened");
        } else {
            trace!(depth = self.depth + 1, "joined open transaction");
        }
        self.depth += 1;
        Ok(self.generation)
    }

    /// Leaves the current transaction, committing the engine transaction if
    /// this was the outermost level.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if `generation` is not current, or the
    /// engine error if the final commit fails.
    pub fn commit(&mut self, generation: Generation) -> CoreResult<()> {
        self.check_generation(generation)?;
        self.depth -= 1;
        if self.depth > 0 {
            trace!(depth = self.depth, "nested commit");
            return Ok(());
        }

        self.generation = self.generation.next();
        if let Err(err) = self.engine.commit() {
            self.release_engine();
            return Err(err.into());
        }
        debug!(generation = %generation, "engine transaction committed");
        Ok(())
    }

    /// Leaves the current transaction, aborting the engine transaction if
    /// this was the outermost level.
    ///
    /// A nested abort makes no engine call: the work stays pending and its
    /// fate is decided by the outermost level.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if `generation` is not current, or the
    /// engine error if the final abort fails.
    pub fn abort(&mut self, generation: Generation) -> CoreResult<()> {
        self.check_generation(generation)?;
        self.depth -= 1;
        if self.depth > 0 {
            trace!(depth = self.depth, "nested abort");
            return Ok(());
        }

        self.generation = self.generation.next();
        if let Err(err) = self.engine.abort() {
            self.release_engine();
            return Err(err.into());
        }
        debug!(generation = %generation, "engine transaction aborted");
        Ok(())
    }

    /// Returns `StaleTransaction` unless `generation` belongs to the open
    /// transaction.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn check_generation(&self, generation: Generation) -> CoreResult<()> {
        if self.depth == 0 || generation != self.generation {
            return Err(CoreError::stale(generation, self.generation));
        }
        Ok(())
    }

    /// Drops an engine transaction left open by a failed commit or abort,
    /// so the write slot is usable again.
    fn release_engine(&mut self) {
        if self.engine.has_active_transaction() {
            if let Err(err) = self.engine.abort() {
                warn!(error = %err, "engine transaction could not be released");
            }
        }
    }

    /// Returns the handle of a collection, opening it on first use or when
    /// the cached handle went stale.
    ///
    /// A cached, fresh handle is returned as is, even if `options` differ
    /// from the ones it was opened with.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after close, or the engine error if the
    /// collection cannot be opened.
    pub fn collection(
        &mut self,
        name: Option<&str>,
        options: CollectionOptions,
    ) -> CoreResult<CollectionHandle> {
        if self.closed {
            return Err(CoreError::DatabaseClosed);
        }
        let key = name.map(str::to_owned);
        if let Some(handle) = self.collections.get(&key) {
            if !self.engine.is_stale(handle) {
                trace!(collection = %handle, "collection cache hit");
                return Ok(handle.clone());
            }
            trace!(collection = %handle, "cached collection is stale, reopening");
        }

        let handle = self.engine.open_collection(name, options)?;
        self.collections.insert(key, handle.clone());
        Ok(handle)
    }

    /// Empties a collection inside the current transaction; with `remove`
    /// the collection is dropped and its cache entry invalidated.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if `generation` is not current, or the
    /// engine error.
    pub fn clear_collection(
        &mut self,
        generation: Generation,
        handle: &CollectionHandle,
        remove: bool,
    ) -> CoreResult<()> {
        self.check_generation(generation)?;
        self.engine.clear_collection(handle, remove)?;
        if remove {
            self.invalidate_collection(handle.name());
        }
        Ok(())
    }

    /// Forgets the cached handle of a collection.
    pub fn invalidate_collection(&mut self, name: Option<&str>) {
        if let Some(handle) = self.collections.remove(&name.map(str::to_owned)) {
            trace!(collection = %handle, "collection cache entry invalidated");
        }
    }

    /// Aborts any open transaction and closes the engine.
    ///
    /// Outstanding handles become stale and every later `begin` fails with
    /// `DatabaseClosed`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the engine fails to close.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.depth > 0 {
            debug!(depth = self.depth, generation = %self.generation, "discarding open transaction");
        }
        self.release_engine();
        self.depth = 0;
        self.generation = self.generation.next();
        self.collections.clear();
        self.engine.close()?;
        Ok(())
    }

    /// Returns the number of logical transactions sharing the engine
    /// transaction.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Returns the current generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns true while the engine has an open write transaction.
    #[must_use]
    pub fn has_active_transaction(&self) -> bool {
        self.engine.has_active_transaction()
    }

    /// Returns true after [`close`](Self::close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn engine(&self) -> &dyn StorageEngine {
        self.engine.as_ref()
    }

    pub(crate) fn engine_mut(&mut self) -> &mut dyn StorageEngine {
        self.engine.as_mut()
    }
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("depth", &self.depth)
            .field("generation", &self.generation)
            .field("collections", &self.collections.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strandkv_storage::{
        FaultInjectingEngine, FaultPlan, FaultPoint, InMemoryEngine, StorageError,
    };

    fn create_coordinator() -> TransactionCoordinator {
        TransactionCoordinator::new(Box::new(InMemoryEngine::new()))
    }

    fn faulty_coordinator() -> (TransactionCoordinator, FaultPlan) {
        let plan = FaultPlan::new();
        let engine = FaultInjectingEngine::new(Box::new(InMemoryEngine::new()), plan.clone());
        (TransactionCoordinator::new(Box::new(engine)), plan)
    }

    #[test]
    fn nested_begin_shares_engine_transaction() {
        let mut coord = create_coordinator();
        assert_eq!(coord.generation(), Generation::FIRST);

        let outer = coord.begin().unwrap();
        let inner = coord.begin().unwrap();
        assert_eq!(outer, inner);
        assert_eq!(coord.depth(), 2);
        assert!(coord.has_active_transaction());

        coord.commit(inner).unwrap();
        assert_eq!(coord.depth(), 1);
        assert!(coord.has_active_transaction());
        assert_eq!(coord.generation(), outer);

        coord.commit(outer).unwrap();
        assert_eq!(coord.depth(), 0);
        assert!(!coord.has_active_transaction());
        assert_eq!(coord.generation(), Generation::new(2));
    }

    #[test]
    fn old_generation_is_stale() {
        let mut coord = create_coordinator();
        let first = coord.begin().unwrap();
        coord.abort(first).unwrap();

        let second = coord.begin().unwrap();
        assert_ne!(first, second);
        assert!(matches!(
            coord.commit(first),
            Err(CoreError::StaleTransaction { .. })
        ));
        assert_eq!(coord.depth(), 1);
        coord.commit(second).unwrap();
    }

    #[test]
    fn commit_without_begin_is_stale() {
        let mut coord = create_coordinator();
        assert!(matches!(
            coord.commit(Generation::FIRST),
            Err(CoreError::StaleTransaction { .. })
        ));
        assert_eq!(coord.depth(), 0);
    }

    #[test]
    fn inner_abort_defers_to_outer_level() {
        let mut coord = create_coordinator();
        let users = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();

        let outer = coord.begin().unwrap();
        let inner = coord.begin().unwrap();
        coord.engine_mut().put(&users, b"k", b"v").unwrap();
        coord.abort(inner).unwrap();
        assert!(coord.has_active_transaction());
        coord.commit(outer).unwrap();

        let check = coord.begin().unwrap();
        assert_eq!(coord.engine().get(&users, b"k").unwrap(), Some(b"v".to_vec()));
        coord.abort(check).unwrap();
    }

    #[test]
    fn failed_begin_leaves_depth_unchanged() {
        let (mut coord, plan) = faulty_coordinator();
        plan.fail_once(FaultPoint::Begin);

        assert!(matches!(
            coord.begin(),
            Err(CoreError::Storage(StorageError::Injected { .. }))
        ));
        assert_eq!(coord.depth(), 0);
        assert_eq!(coord.generation(), Generation::FIRST);

        let generation = coord.begin().unwrap();
        coord.commit(generation).unwrap();
    }

    #[test]
    fn failed_commit_releases_engine() {
        let (mut coord, plan) = faulty_coordinator();
        plan.fail_once(FaultPoint::Commit);

        let generation = coord.begin().unwrap();
        assert!(coord.commit(generation).is_err());
        assert_eq!(coord.depth(), 0);
        assert!(!coord.has_active_transaction());

        let next = coord.begin().unwrap();
        assert_eq!(next, generation.next());
        coord.commit(next).unwrap();
    }

    #[test]
    fn collection_cache_refreshes_stale_handles() {
        let mut coord = create_coordinator();
        let first = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        let again = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert_eq!(first, again);

        let generation = coord.begin().unwrap();
        coord.clear_collection(generation, &first, true).unwrap();
        coord.commit(generation).unwrap();

        let reopened = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert_ne!(reopened.id(), first.id());
    }

    fn is_cached(coord: &TransactionCoordinator, name: &str) -> bool {
        coord.collections.contains_key(&Some(name.to_owned()))
    }

    #[test]
    fn invalidate_forgets_cached_handle() {
        let (mut coord, plan) = faulty_coordinator();
        let users = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();

        // Cache hits never reach the engine.
        plan.fail_always(FaultPoint::OpenCollection);
        assert_eq!(
            coord
                .collection(Some("users"), CollectionOptions::new())
                .unwrap(),
            users
        );

        coord.invalidate_collection(Some("users"));
        assert!(!is_cached(&coord, "users"));
        assert!(matches!(
            coord.collection(Some("users"), CollectionOptions::new()),
            Err(CoreError::Storage(StorageError::Injected {
                operation: "open_collection"
            }))
        ));

        plan.disarm();
        let reopened = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert_eq!(reopened, users);
        assert!(is_cached(&coord, "users"));
    }

    #[test]
    fn invalidate_ignores_generation() {
        let (mut coord, plan) = faulty_coordinator();
        coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();

        let first = coord.begin().unwrap();
        coord.commit(first).unwrap();
        let second = coord.begin().unwrap();
        assert_ne!(first, second);

        coord.invalidate_collection(Some("users"));
        assert!(!is_cached(&coord, "users"));

        plan.fail_once(FaultPoint::OpenCollection);
        assert!(coord
            .collection(Some("users"), CollectionOptions::new())
            .is_err());
        coord.commit(second).unwrap();
        assert_eq!(plan.triggered(), 1);

        // Unknown names are a no-op.
        coord.invalidate_collection(Some("missing"));
        coord.invalidate_collection(None);
    }

    #[test]
    fn removing_a_collection_drops_its_cache_entry() {
        let mut coord = create_coordinator();
        let users = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        coord
            .collection(Some("orders"), CollectionOptions::new())
            .unwrap();

        let generation = coord.begin().unwrap();
        coord.clear_collection(generation, &users, false).unwrap();
        assert!(is_cached(&coord, "users"));

        coord.clear_collection(generation, &users, true).unwrap();
        assert!(!is_cached(&coord, "users"));
        assert!(is_cached(&coord, "orders"));
        coord.commit(generation).unwrap();
    }

    #[test]
    fn clear_collection_checks_generation() {
        let mut coord = create_coordinator();
        let users = coord
            .collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert!(matches!(
            coord.clear_collection(Generation::FIRST, &users, false),
            Err(CoreError::StaleTransaction { .. })
        ));
    }

    #[test]
    fn close_aborts_and_rejects() {
        let mut coord = create_coordinator();
        let generation = coord.begin().unwrap();
        coord.begin().unwrap();

        coord.close().unwrap();
        assert!(coord.is_closed());
        assert_eq!(coord.depth(), 0);
        assert!(!coord.has_active_transaction());
        assert!(matches!(
            coord.commit(generation),
            Err(CoreError::StaleTransaction { .. })
        ));
        assert!(matches!(coord.begin(), Err(CoreError::DatabaseClosed)));
        assert!(matches!(
            coord.collection(None, CollectionOptions::new()),
            Err(CoreError::DatabaseClosed)
        ));

        coord.close().unwrap();
    }

    mod nesting {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn outermost_level_decides(
                transactions in prop::collection::vec(
                    prop::collection::vec(any::<bool>(), 1..6),
                    1..12,
                ),
            ) {
                let mut coord = create_coordinator();
                let data = coord
                    .collection(Some("data"), CollectionOptions::new())
                    .unwrap();
                let mut expected = Generation::FIRST;

                for (i, levels) in transactions.iter().enumerate() {
                    for _ in levels {
                        prop_assert_eq!(coord.begin().unwrap(), expected);
                    }
                    prop_assert_eq!(coord.depth() as usize, levels.len());
                    let key = (i as u32).to_be_bytes();
                    coord.engine_mut().put(&data, &key, b"v").unwrap();

                    for (depth, commit) in levels.iter().enumerate().rev() {
                        if *commit {
                            coord.commit(expected).unwrap();
                        } else {
                            coord.abort(expected).unwrap();
                        }
                        prop_assert_eq!(coord.depth() as usize, depth);
                    }
                    prop_assert!(!coord.has_active_transaction());
                    prop_assert_eq!(coord.generation(), expected.next());
                    expected = expected.next();
                }

                let generation = coord.begin().unwrap();
                for (i, levels) in transactions.iter().enumerate() {
                    let key = (i as u32).to_be_bytes();
                    prop_assert_eq!(coord.engine().has(&data, &key).unwrap(), levels[0]);
                }
                coord.abort(generation).unwrap();
            }
        }
    }
}
