//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use strandkv_core::{Config, Database};
use strandkv_storage::{FaultInjectingEngine, FaultPlan, InMemoryEngine};

/// Name of the collection the fixtures and scenarios write to.
pub const TEST_COLLECTION: &str = "test";

/// A test database, optionally backed by a fault-injecting engine.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// Fault switchboard, for databases created with [`TestDatabase::faulty`].
    plan: Option<FaultPlan>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            plan: None,
        }
    }

    /// Creates a database whose engine fails on demand.
    pub fn faulty() -> Self {
        let plan = FaultPlan::new();
        let engine = FaultInjectingEngine::new(Box::new(InMemoryEngine::new()), plan.clone());
        let db = Database::open_with_engine(Config::default(), Box::new(engine))
            .expect("Failed to open fault-injecting database");
        Self {
            db,
            plan: Some(plan),
        }
    }

    /// Returns the fault plan if the database was created with
    /// [`TestDatabase::faulty`].
    pub fn plan(&self) -> Option<&FaultPlan> {
        self.plan.as_ref()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use strandkv_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     db.run_transaction(|txn| txn.collection("test").map(|_| ()))
///         .unwrap();
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a fault-injecting database and its plan.
pub fn with_faulty_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &FaultPlan) -> R,
{
    let test_db = TestDatabase::faulty();
    let plan = test_db.plan().expect("Faulty database should have a plan");
    f(&test_db.db, plan)
}

/// Reads `key` from the test collection in its own transaction.
pub fn read_key(db: &Database, key: &[u8]) -> Option<Vec<u8>> {
    db.run_transaction(|txn| {
        let collection = txn.collection(TEST_COLLECTION)?;
        txn.get(&collection, key)
    })
    .expect("Failed to read key")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database with `count` keys `key_<i>` in the test collection.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();

        for i in 0..count {
            let key = format!("key_{i}").into_bytes();
            let value = format!("value_{i}").into_bytes();
            test_db
                .db
                .run_transaction(|txn| {
                    let collection = txn.collection(TEST_COLLECTION)?;
                    txn.put(&collection, &key, &value)
                })
                .expect("Failed to put key");
        }

        test_db
    }
}
