//! In-memory storage engine.

use crate::collection::{CollectionHandle, CollectionId, CollectionOptions};
use crate::engine::{EngineConfig, StorageEngine};
use crate::error::{StorageError, StorageResult};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use tracing::trace;

/// Catalog key: `None` is the default collection.
type TableName = Option<String>;

/// Contents of one collection.
#[derive(Debug, Clone)]
enum Table {
    Plain(BTreeMap<Vec<u8>, Vec<u8>>),
    DupSort(BTreeMap<Vec<u8>, BTreeSet<Vec<u8>>>),
}

impl Table {
    fn new(dupsort: bool) -> Self {
        if dupsort {
            Self::DupSort(BTreeMap::new())
        } else {
            Self::Plain(BTreeMap::new())
        }
    }

    fn is_dupsort(&self) -> bool {
        matches!(self, Self::DupSort(_))
    }

    fn put(&mut self, key: &[u8], value: &[u8]) {
        match self {
            Self::Plain(map) => {
                map.insert(key.to_vec(), value.to_vec());
            }
            Self::DupSort(map) => {
                map.entry(key.to_vec()).or_default().insert(value.to_vec());
            }
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::Plain(map) => map.get(key).cloned(),
            Self::DupSort(map) => map.get(key).and_then(|values| values.first().cloned()),
        }
    }

    fn value_count(&self, key: &[u8]) -> usize {
        match self {
            Self::Plain(map) => usize::from(map.contains_key(key)),
            Self::DupSort(map) => map.get(key).map_or(0, BTreeSet::len),
        }
    }

    fn has_dup(&self, key: &[u8], value: &[u8]) -> bool {
        match self {
            Self::Plain(map) => map.get(key).is_some_and(|stored| stored == value),
            Self::DupSort(map) => map.get(key).is_some_and(|values| values.contains(value)),
        }
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        match self {
            Self::Plain(map) => map.remove(key).is_some(),
            Self::DupSort(map) => map.remove(key).is_some(),
        }
    }

    fn delete_dup(&mut self, key: &[u8], value: &[u8]) -> bool {
        match self {
            Self::Plain(map) => {
                if map.get(key).is_some_and(|stored| stored == value) {
                    map.remove(key);
                    true
                } else {
                    false
                }
            }
            Self::DupSort(map) => {
                let Some(values) = map.get_mut(key) else {
                    return false;
                };
                let removed = values.remove(value);
                if values.is_empty() {
                    map.remove(key);
                }
                removed
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Plain(map) => map.clear(),
            Self::DupSort(map) => map.clear(),
        }
    }

    fn seek(&self, lower: Bound<&[u8]>, upper: Bound<&[u8]>, reverse: bool) -> Option<Vec<u8>> {
        match self {
            Self::Plain(map) => seek_key(map, lower, upper, reverse),
            Self::DupSort(map) => seek_key(map, lower, upper, reverse),
        }
    }
}

fn seek_key<V>(
    map: &BTreeMap<Vec<u8>, V>,
    lower: Bound<&[u8]>,
    upper: Bound<&[u8]>,
    reverse: bool,
) -> Option<Vec<u8>> {
    let mut range = map.range::<[u8], _>((lower, upper));
    let entry = if reverse {
        range.next_back()
    } else {
        range.next()
    };
    entry.map(|(key, _)| key.clone())
}

#[derive(Debug, Clone, Copy)]
struct CatalogEntry {
    id: CollectionId,
    dupsort: bool,
}

/// A single-writer in-memory engine.
///
/// A write transaction works on a private copy of the committed tables;
/// commit publishes the copy and abort drops it. Collections opened inside
/// a transaction are forgotten when it aborts.
///
/// # Example
///
/// ```rust
/// use strandkv_storage::{CollectionOptions, InMemoryEngine, StorageEngine};
///
/// let mut engine = InMemoryEngine::new();
/// let users = engine.open_collection(Some("users"), CollectionOptions::new()).unwrap();
///
/// engine.begin().unwrap();
/// engine.put(&users, b"alice", b"1").unwrap();
/// engine.commit().unwrap();
///
/// engine.begin().unwrap();
/// assert_eq!(engine.get(&users, b"alice").unwrap(), Some(b"1".to_vec()));
/// engine.abort().unwrap();
/// ```
#[derive(Debug)]
pub struct InMemoryEngine {
    config: EngineConfig,
    open: bool,
    /// Committed tables.
    tables: HashMap<TableName, Table>,
    /// Working copy of the open write transaction.
    txn: Option<HashMap<TableName, Table>>,
    /// Opened collections.
    catalog: HashMap<TableName, CatalogEntry>,
    /// Collections opened inside the current transaction.
    pending: HashSet<TableName>,
    next_id: u32,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

impl InMemoryEngine {
    /// Creates an empty writable engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine with the given configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            open: true,
            tables: HashMap::new(),
            txn: None,
            catalog: HashMap::new(),
            pending: HashSet::new(),
            next_id: 1,
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the number of opened collections.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.catalog.len()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.config.read_only {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn table(&self, handle: &CollectionHandle) -> StorageResult<&Table> {
        self.ensure_open()?;
        let tables = self.txn.as_ref().ok_or(StorageError::NoTransaction)?;
        if self.is_stale(handle) {
            return Err(StorageError::stale_collection(handle.name()));
        }
        tables
            .get(&handle.name().map(str::to_owned))
            .ok_or_else(|| StorageError::stale_collection(handle.name()))
    }

    fn table_mut(&mut self, handle: &CollectionHandle) -> StorageResult<&mut Table> {
        self.ensure_open()?;
        self.ensure_writable()?;
        if self.txn.is_none() {
            return Err(StorageError::NoTransaction);
        }
        if self.is_stale(handle) {
            return Err(StorageError::stale_collection(handle.name()));
        }
        self.txn
            .as_mut()
            .and_then(|tables| tables.get_mut(&handle.name().map(str::to_owned)))
            .ok_or_else(|| StorageError::stale_collection(handle.name()))
    }
}

impl StorageEngine for InMemoryEngine {
    fn begin(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(StorageError::TransactionActive);
        }
        self.txn = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        let tables = self.txn.take().ok_or(StorageError::NoTransaction)?;
        self.tables = tables;
        self.pending.clear();
        Ok(())
    }

    fn abort(&mut self) -> StorageResult<()> {
        self.ensure_open()?;
        self.txn.take().ok_or(StorageError::NoTransaction)?;
        for name in self.pending.drain() {
            trace!(collection = ?name, "forgetting collection opened by aborted transaction");
            self.catalog.remove(&name);
        }
        Ok(())
    }

    fn has_active_transaction(&self) -> bool {
        self.txn.is_some()
    }

    fn open_collection(
        &mut self,
        name: Option<&str>,
        options: CollectionOptions,
    ) -> StorageResult<CollectionHandle> {
        self.ensure_open()?;
        let key: TableName = name.map(str::to_owned);

        if let Some(entry) = self.catalog.get(&key) {
            return Ok(CollectionHandle::new(name, entry.id, entry.dupsort));
        }

        if let Some(max) = self.config.max_collections {
            if self.catalog.len() >= max as usize {
                return Err(StorageError::CollectionLimit { max });
            }
        }

        let read_only = self.config.read_only;
        let in_txn = self.txn.is_some();
        let tables = match self.txn.as_mut() {
            Some(tables) => tables,
            None => &mut self.tables,
        };
        let dupsort = match tables.get(&key) {
            Some(table) if table.is_dupsort() != options.dupsort => {
                return Err(StorageError::IncompatibleCollection { name: key });
            }
            Some(table) => table.is_dupsort(),
            None if read_only => return Err(StorageError::not_found(name)),
            None => {
                tables.insert(key.clone(), Table::new(options.dupsort));
                options.dupsort
            }
        };

        let id = CollectionId::new(self.next_id);
        self.next_id += 1;
        self.catalog.insert(key.clone(), CatalogEntry { id, dupsort });
        if in_txn {
            self.pending.insert(key);
        }
        trace!(collection = ?name, %id, dupsort, "opened collection");
        Ok(CollectionHandle::new(name, id, dupsort))
    }

    fn is_stale(&self, handle: &CollectionHandle) -> bool {
        self.catalog
            .get(&handle.name().map(str::to_owned))
            .map_or(true, |entry| entry.id != handle.id())
    }

    fn clear_collection(&mut self, handle: &CollectionHandle, remove: bool) -> StorageResult<()> {
        self.table_mut(handle)?.clear();
        if remove {
            let key = handle.name().map(str::to_owned);
            if let Some(tables) = self.txn.as_mut() {
                tables.remove(&key);
            }
            self.catalog.remove(&key);
            self.pending.remove(&key);
            trace!(collection = ?handle.name(), "dropped collection");
        }
        Ok(())
    }

    fn put(&mut self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.table_mut(handle)?.put(key, value);
        Ok(())
    }

    fn get(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table(handle)?.get(key))
    }

    fn value_count(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<usize> {
        Ok(self.table(handle)?.value_count(key))
    }

    fn has(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool> {
        Ok(self.table(handle)?.value_count(key) > 0)
    }

    fn has_dup(&self, handle: &CollectionHandle, key: &[u8], value: &[u8]) -> StorageResult<bool> {
        Ok(self.table(handle)?.has_dup(key, value))
    }

    fn delete(&mut self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<bool> {
        Ok(self.table_mut(handle)?.delete(key))
    }

    fn delete_dup(
        &mut self,
        handle: &CollectionHandle,
        key: &[u8],
        value: &[u8],
    ) -> StorageResult<bool> {
        Ok(self.table_mut(handle)?.delete_dup(key, value))
    }

    fn first_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .table(handle)?
            .seek(Bound::Unbounded, Bound::Unbounded, false))
    }

    fn last_key(&self, handle: &CollectionHandle) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .table(handle)?
            .seek(Bound::Unbounded, Bound::Unbounded, true))
    }

    fn next_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .table(handle)?
            .seek(Bound::Excluded(key), Bound::Unbounded, false))
    }

    fn prev_key(&self, handle: &CollectionHandle, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .table(handle)?
            .seek(Bound::Unbounded, Bound::Excluded(key), true))
    }

    fn lower_bound_key(
        &self,
        handle: &CollectionHandle,
        key: &[u8],
    ) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .table(handle)?
            .seek(Bound::Included(key), Bound::Unbounded, false))
    }

    fn close(&mut self) -> StorageResult<()> {
        self.open = false;
        self.txn = None;
        self.catalog.clear();
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with(name: &str, dupsort: bool) -> (InMemoryEngine, CollectionHandle) {
        let mut engine = InMemoryEngine::new();
        let handle = engine
            .open_collection(Some(name), CollectionOptions::new().dupsort(dupsort))
            .unwrap();
        (engine, handle)
    }

    #[test]
    fn single_writer_slot() {
        let mut engine = InMemoryEngine::new();
        assert!(!engine.has_active_transaction());

        engine.begin().unwrap();
        assert!(engine.has_active_transaction());
        assert!(matches!(engine.begin(), Err(StorageError::TransactionActive)));

        engine.commit().unwrap();
        assert!(!engine.has_active_transaction());
        assert!(matches!(engine.commit(), Err(StorageError::NoTransaction)));
        assert!(matches!(engine.abort(), Err(StorageError::NoTransaction)));
    }

    #[test]
    fn data_operations_need_transaction() {
        let (mut engine, users) = engine_with("users", false);
        assert!(matches!(
            engine.put(&users, b"k", b"v"),
            Err(StorageError::NoTransaction)
        ));
        assert!(matches!(
            engine.get(&users, b"k"),
            Err(StorageError::NoTransaction)
        ));
    }

    #[test]
    fn commit_publishes_and_abort_discards() {
        let (mut engine, users) = engine_with("users", false);

        engine.begin().unwrap();
        engine.put(&users, b"a", b"1").unwrap();
        engine.commit().unwrap();

        engine.begin().unwrap();
        engine.put(&users, b"b", b"2").unwrap();
        assert!(engine.has(&users, b"b").unwrap());
        engine.abort().unwrap();

        engine.begin().unwrap();
        assert_eq!(engine.get(&users, b"a").unwrap(), Some(b"1".to_vec()));
        assert!(!engine.has(&users, b"b").unwrap());
        engine.abort().unwrap();
    }

    #[test]
    fn key_navigation() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        for key in [b"b", b"d", b"f"] {
            engine.put(&users, key, b"x").unwrap();
        }

        assert_eq!(engine.first_key(&users).unwrap(), Some(b"b".to_vec()));
        assert_eq!(engine.last_key(&users).unwrap(), Some(b"f".to_vec()));
        assert_eq!(engine.next_key(&users, b"b").unwrap(), Some(b"d".to_vec()));
        assert_eq!(engine.next_key(&users, b"c").unwrap(), Some(b"d".to_vec()));
        assert_eq!(engine.next_key(&users, b"f").unwrap(), None);
        assert_eq!(engine.prev_key(&users, b"d").unwrap(), Some(b"b".to_vec()));
        assert_eq!(engine.prev_key(&users, b"z").unwrap(), Some(b"f".to_vec()));
        assert_eq!(engine.prev_key(&users, b"b").unwrap(), None);
        assert_eq!(
            engine.lower_bound_key(&users, b"d").unwrap(),
            Some(b"d".to_vec())
        );
        assert_eq!(
            engine.lower_bound_key(&users, b"e").unwrap(),
            Some(b"f".to_vec())
        );
        assert_eq!(engine.lower_bound_key(&users, b"g").unwrap(), None);
    }

    #[test]
    fn empty_collection_navigation() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        assert_eq!(engine.first_key(&users).unwrap(), None);
        assert_eq!(engine.last_key(&users).unwrap(), None);
    }

    #[test]
    fn dupsort_values() {
        let (mut engine, tags) = engine_with("tags", true);
        engine.begin().unwrap();
        engine.put(&tags, b"k", b"b").unwrap();
        engine.put(&tags, b"k", b"a").unwrap();
        engine.put(&tags, b"k", b"a").unwrap();

        assert_eq!(engine.value_count(&tags, b"k").unwrap(), 2);
        assert_eq!(engine.get(&tags, b"k").unwrap(), Some(b"a".to_vec()));
        assert!(engine.has_dup(&tags, b"k", b"b").unwrap());
        assert!(!engine.has_dup(&tags, b"k", b"c").unwrap());

        assert!(engine.delete_dup(&tags, b"k", b"a").unwrap());
        assert!(!engine.delete_dup(&tags, b"k", b"a").unwrap());
        assert_eq!(engine.value_count(&tags, b"k").unwrap(), 1);

        assert!(engine.delete_dup(&tags, b"k", b"b").unwrap());
        assert!(!engine.has(&tags, b"k").unwrap());
    }

    #[test]
    fn plain_delete() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        engine.put(&users, b"k", b"v").unwrap();
        assert!(!engine.delete_dup(&users, b"k", b"other").unwrap());
        assert!(engine.delete(&users, b"k").unwrap());
        assert!(!engine.delete(&users, b"k").unwrap());
    }

    #[test]
    fn reopen_returns_same_handle() {
        let mut engine = InMemoryEngine::new();
        let first = engine.open_collection(None, CollectionOptions::new()).unwrap();
        let second = engine.open_collection(None, CollectionOptions::new()).unwrap();
        assert_eq!(first, second);
        assert!(!engine.is_stale(&first));
    }

    #[test]
    fn collection_opened_in_aborted_transaction_is_stale() {
        let mut engine = InMemoryEngine::new();
        engine.begin().unwrap();
        let temp = engine
            .open_collection(Some("temp"), CollectionOptions::new())
            .unwrap();
        engine.put(&temp, b"k", b"v").unwrap();
        engine.abort().unwrap();

        assert!(engine.is_stale(&temp));
        assert_eq!(engine.collection_count(), 0);
    }

    #[test]
    fn remove_makes_handle_stale_and_reopen_gets_new_id() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        engine.put(&users, b"k", b"v").unwrap();
        engine.clear_collection(&users, true).unwrap();
        assert!(engine.is_stale(&users));
        assert!(matches!(
            engine.get(&users, b"k"),
            Err(StorageError::StaleCollection { .. })
        ));

        let reopened = engine
            .open_collection(Some("users"), CollectionOptions::new())
            .unwrap();
        assert_ne!(reopened.id(), users.id());
        assert!(!engine.has(&reopened, b"k").unwrap());
        engine.commit().unwrap();
    }

    #[test]
    fn clear_without_remove_keeps_handle() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        engine.put(&users, b"k", b"v").unwrap();
        engine.clear_collection(&users, false).unwrap();
        assert!(!engine.is_stale(&users));
        assert!(!engine.has(&users, b"k").unwrap());
    }

    #[test]
    fn closed_engine_forgets_catalog() {
        let mut engine = InMemoryEngine::new();
        engine.begin().unwrap();
        let tags = engine
            .open_collection(Some("tags"), CollectionOptions::new().dupsort(true))
            .unwrap();
        engine.commit().unwrap();
        engine.close().unwrap();
        assert!(engine.is_stale(&tags));
        assert!(matches!(
            engine.open_collection(Some("tags"), CollectionOptions::new()),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn incompatible_options() {
        let mut engine = InMemoryEngine::new();
        let tags = engine
            .open_collection(Some("tags"), CollectionOptions::new().dupsort(true))
            .unwrap();
        // An aborted drop forgets the catalog entry but keeps the table.
        engine.begin().unwrap();
        engine.clear_collection(&tags, true).unwrap();
        engine.abort().unwrap();

        assert!(matches!(
            engine.open_collection(Some("tags"), CollectionOptions::new()),
            Err(StorageError::IncompatibleCollection { .. })
        ));
        let reopened = engine
            .open_collection(Some("tags"), CollectionOptions::new().dupsort(true))
            .unwrap();
        assert!(reopened.is_dupsort());
    }

    #[test]
    fn read_only_engine() {
        let mut engine = InMemoryEngine::with_config(EngineConfig::new().read_only(true));
        assert!(matches!(
            engine.open_collection(Some("users"), CollectionOptions::new()),
            Err(StorageError::NotFound { .. })
        ));

        let mut writable = InMemoryEngine::new();
        let users = writable
            .open_collection(Some("users"), CollectionOptions::new())
            .unwrap();
        writable.config.read_only = true;
        writable.begin().unwrap();
        assert!(matches!(
            writable.put(&users, b"k", b"v"),
            Err(StorageError::ReadOnly)
        ));
        assert_eq!(writable.get(&users, b"k").unwrap(), None);
    }

    #[test]
    fn collection_limit() {
        let mut engine = InMemoryEngine::with_config(EngineConfig::new().max_collections(1));
        engine
            .open_collection(Some("a"), CollectionOptions::new())
            .unwrap();
        assert!(matches!(
            engine.open_collection(Some("b"), CollectionOptions::new()),
            Err(StorageError::CollectionLimit { max: 1 })
        ));
    }

    #[test]
    fn closed_engine_rejects_everything() {
        let (mut engine, users) = engine_with("users", false);
        engine.begin().unwrap();
        engine.close().unwrap();

        assert!(!engine.is_open());
        assert!(!engine.has_active_transaction());
        assert!(matches!(engine.begin(), Err(StorageError::Closed)));
        assert!(matches!(engine.get(&users, b"k"), Err(StorageError::Closed)));
    }

    mod navigation {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn navigation_matches_sorted_model(
                keys in prop::collection::btree_set(prop::collection::vec(any::<u8>(), 0..4), 0..24),
                probe in prop::collection::vec(any::<u8>(), 0..4),
            ) {
                let (mut engine, handle) = engine_with("nav", false);
                engine.begin().unwrap();
                for key in &keys {
                    engine.put(&handle, key, b"v").unwrap();
                }

                prop_assert_eq!(engine.first_key(&handle).unwrap(), keys.first().cloned());
                prop_assert_eq!(engine.last_key(&handle).unwrap(), keys.last().cloned());
                prop_assert_eq!(
                    engine.next_key(&handle, &probe).unwrap(),
                    keys.iter().find(|k| **k > probe).cloned()
                );
                prop_assert_eq!(
                    engine.prev_key(&handle, &probe).unwrap(),
                    keys.iter().rev().find(|k| **k < probe).cloned()
                );
                prop_assert_eq!(
                    engine.lower_bound_key(&handle, &probe).unwrap(),
                    keys.iter().find(|k| **k >= probe).cloned()
                );
            }
        }
    }
}
