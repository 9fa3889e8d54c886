//! Fault-injecting engine wrapper.
//!
//! Wraps any engine and fails selected primitives on demand.
//! Failing calls never reach the inner engine, so its state is exactly as
//! it was before the call.

use crate::collection::{CollectionHandle, CollectionOptions};
use crate::engine::StorageEngine;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// Engine primitive that can be failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `StorageEngine::begin`.
    Begin,
    /// `StorageEngine::commit`.
    Commit,
    /// `StorageEngine::abort`.
    Abort,
    /// `StorageEngine::open_collection`.
    OpenCollection,
}

impl FaultPoint {
    fn operation(self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Abort => "abort",
            Self::OpenCollection => "open_collection",
        }
    }
}

#[derive(Debug, Default)]
struct FaultState {
    /// Points that fail on every call until disarmed.
    persistent: Vec<FaultPoint>,
    /// Points that fail exactly once.
    once: Vec<FaultPoint>,
    /// Number of failures produced so far.
    triggered: usize,
}

/// Shared switchboard for a [`FaultInjectingEngine`].
///
/// Cloning the plan shares it, so a test can keep one clone and re-arm
/// faults after the engine has been moved into a database.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    state: Arc<Mutex<FaultState>>,
}

impl FaultPlan {
    /// Creates a plan with nothing armed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call of `point` only.
    pub fn fail_once(&self, point: FaultPoint) {
        self.state.lock().once.push(point);
    }

    /// Fails every call of `point` until [`FaultPlan::disarm`].
    pub fn fail_always(&self, point: FaultPoint) {
        let mut state = self.state.lock();
        if !state.persistent.contains(&point) {
            state.persistent.push(point);
        }
    }

    /// Removes all armed faults.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        state.persistent.clear();
        state.once.clear();
    }

    /// Returns how many failures were produced.
    #[must_use]
    pub fn triggered(&self) -> usize {
        self.state.lock().triggered
    }

    fn check(&self, point: FaultPoint) -> StorageResult<()> {
        let mut state = self.state.lock();
        let hit = if let Some(pos) = state.once.iter().position(|p| *p == point) {
            state.once.remove(pos);
            true
        } else {
            state.persistent.contains(&point)
        };
        if hit {
            state.triggered += 1;
            Err(StorageError::Injected {
                operation: point.operation(),
            })
        } else {
            Ok(())
        }
    }
}

/// An engine wrapper that fails engine primitives according to a
/// [`FaultPlan`].
///
/// # Example
///
/// ```rust
/// use strandkv_storage::{FaultInjectingEngine, FaultPlan, FaultPoint, InMemoryEngine, StorageEngine};
///
/// let plan = FaultPlan::new();
/// let mut engine = FaultInjectingEngine::new(Box::new(InMemoryEngine::new()), plan.clone());
///
/// plan.fail_once(FaultPoint::Begin);
/// assert!(engine.begin().is_err());
/// assert!(engine.begin().is_ok());
/// ```
pub struct FaultInjectingEngine {
    inner: Box<dyn StorageEngine>,
    plan: FaultPlan,
}

impl FaultInjectingEngine {
    /// Wraps `inner`, consulting `plan` before each armable primitive.
    pub fn new(inner: Box<dyn StorageEngine>, plan: FaultPlan) -> Self {
        Self { inner, plan }
    }

    /// Returns the fault plan.
    #[must_use]
    pub fn plan(&self) -> &FaultPlan {
        &self.plan
    }
}

impl std::fmt::Debug for FaultInjectingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultInjectingEngine")
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl StorageEngine for FaultInjectingEngine {
    fn begin(&mut self) -> StorageResult<()> {
        self.plan.check(FaultPoint::Begin)?;
        self.inner.begin()
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.plan.check(FaultPoint::Commit)?;
        self.inner.commit()
    }

    fn abort(&mut self) -> StorageResult<()> {
        self.plan.check(FaultPoint::Abort)?;
        self.inner.abort()
    }

    fn has_active_transaction(&self) -> bool {
        self.inner.has_active_transaction()
    }

    fn open_collection(
        &mut self,
        name: Option<&str>,
        options: CollectionOptions,
    ) -> StorageResult<CollectionHandle> {
        self.plan.check(FaultPoint::OpenCollection)?;
        self.inner.open_collection(name, options)
    }

    fn is_stale(&self, handle: &CollectionHandle) -> bool {
        self.inner.is_stale(handle)
    }

    fn clear_collection(&mut self, handle: &CollectionHandle, remove: bool) -> StorageResult<()> {
        self.inner.clear_collection(handle, remove)
    }

    fn put(&mut self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.inner.put(handle, key, value)
    }

    fn get(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(handle, key)
    }

    fn value_count(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<usize> {
        self.inner.value_count(handle, key)
    }

    fn has(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool> {
        self.inner.has(handle, key)
    }

    fn has_dup(&self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<bool> {
        self.inner.has_dup(handle, key, value)
    }

    fn delete(&mut self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool> {
        self.inner.delete(handle, key)
    }

    fn delete_dup(
        &mut self,
        handle: &CollectionHandle,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool> {
        self.inner.delete_dup(handle, key, value)
    }

    fn first_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>> {
        self.inner.first_key(handle)
    }

    fn last_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>> {
        self.inner.last_key(handle)
    }

    fn next_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.next_key(handle, key)
    }

    fn prev_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.inner.prev_key(handle, key)
    }

    fn lower_bound_key(
        &self,
        handle: &CollectionHandle,
        key: &[u8],
    ) -> StorageResult<Option<Vec<u8>>> {
        self.inner.lower_bound_key(handle, key)
    }

    fn close(&mut self) -> StorageResult<()> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryEngine;

    fn create_engine() -> (FaultInjectingEngine, FaultPlan) {
        let plan = FaultPlan::new();
        let engine = FaultInjectingEngine::new(Box::new(InMemoryEngine::new()), plan.clone());
        (engine, plan)
    }

    #[test]
    fn fail_once_fires_a_single_time() {
        let (mut engine, plan) = create_engine();
        plan.fail_once(FaultPoint::Begin);

        assert!(matches!(
            engine.begin(),
            Err(StorageError::Injected { operation: "begin" })
        ));
        assert!(!engine.has_active_transaction());
        engine.begin().unwrap();
        assert_eq!(plan.triggered(), 1);
    }

    #[test]
    fn failed_abort_leaves_transaction_open() {
        let (mut engine, plan) = create_engine();
        engine.begin().unwrap();
        plan.fail_always(FaultPoint::Abort);

        assert!(engine.abort().is_err());
        assert!(engine.abort().is_err());
        assert!(engine.has_active_transaction());

        plan.disarm();
        engine.abort().unwrap();
        assert!(!engine.has_active_transaction());
        assert_eq!(plan.triggered(), 2);
    }

    #[test]
    fn unarmed_points_pass_through() {
        let (mut engine, plan) = create_engine();
        plan.fail_once(FaultPoint::Commit);
        let users = engine
            .open_collection(Some("users"), CollectionOptions::new())
            .unwrap();

        engine.begin().unwrap();
        engine.put(&users, b"k", b"v").unwrap();
        assert!(engine.commit().is_err());
        engine.commit().unwrap();

        engine.begin().unwrap();
        assert!(engine.has(&users, b"k").unwrap());
        engine.abort().unwrap();
    }

    #[test]
    fn failed_open_creates_nothing() {
        let (mut engine, plan) = create_engine();
        plan.fail_once(FaultPoint::OpenCollection);

        assert!(matches!(
            engine.open_collection(Some("users"), CollectionOptions::new()),
            Err(StorageError::Injected {
                operation: "open_collection"
            })
        ));
        let users = engine
            .open_collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert!(!engine.is_stale(&users));
        assert_eq!(plan.triggered(), 1);
    }
}
