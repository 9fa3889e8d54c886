//! Database facade.

use crate::config::Config;
use crate::context::Transaction;
use crate::error::{CoreError, CoreResult};
use crate::queue::{deferred, Deferred, DrainQueue, Job};
use crate::transaction::{TransactionCoordinator, TransactionHandle};
use crate::types::Generation;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strandkv_storage::{InMemoryEngine, StorageEngine, StorageError};
use tracing::{debug, warn};

/// The main database handle.
///
/// `Database` is the entry point of strandkv. It serializes every
/// transaction of the process onto the engine's single write transaction:
/// - [`run_transaction`](Self::run_transaction) runs an action now, nesting
///   into a transaction the calling thread already has open
/// - [`run_transaction_async`](Self::run_transaction_async) queues an
///   action; queued actions run one at a time in submission order
///
/// Cloning a `Database` is cheap and shares the same store. The last clone
/// closes the database when dropped.
///
/// # Example
///
/// ```rust
/// use strandkv_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
///
/// db.run_transaction(|txn| {
///     let users = txn.collection("users")?;
///     txn.put(&users, b"alice", b"admin")?;
///     Ok(())
/// })
/// .unwrap();
///
/// let role = db
///     .run_transaction_async(|txn| {
///         let users = txn.collection("users")?;
///         txn.get(&users, b"alice")
///     })
///     .wait()
///     .unwrap();
/// assert_eq!(role, Some(b"admin".to_vec()));
/// ```
///
/// # Deadlocks
///
/// An action must not wait for a request it queued itself: the queue does
/// not move past the running action, so the wait never ends. For the same
/// reason [`flush_queue`](Self::flush_queue) must not be called while the
/// calling thread has a transaction open.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    /// Configuration.
    config: Config,
    /// Write slot. The owning thread may re-enter to nest transactions.
    slot: ReentrantMutex<RefCell<TransactionCoordinator>>,
    /// Queued transaction requests.
    queue: DrainQueue,
    /// Set once by `close`.
    closed: AtomicBool,
}

impl Database {
    /// Opens a fresh in-memory database with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_config(Config::default())
    }

    /// Opens a fresh in-memory database with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be opened.
    pub fn open_with_config(config: Config) -> CoreResult<Self> {
        let engine = InMemoryEngine::with_config(config.engine_config());
        Self::open_with_engine(config, Box::new(engine))
    }

    /// Opens a database on top of an existing engine.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the engine is already closed.
    pub fn open_with_engine(config: Config, engine: Box<dyn StorageEngine>) -> CoreResult<Self> {
        if !engine.is_open() {
            return Err(StorageError::Closed.into());
        }
        let queue = DrainQueue::new(config.worker_thread_name.clone());
        debug!(read_only = config.read_only, "database opened");
        Ok(Self {
            inner: Arc::new(DatabaseInner {
                config,
                slot: ReentrantMutex::new(RefCell::new(TransactionCoordinator::new(engine))),
                queue,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Runs `action` in a transaction on the calling thread.
    ///
    /// If the calling thread already has a transaction open, the action
    /// joins it as a nested level; otherwise a new engine transaction is
    /// opened. Another thread's transaction is waited for.
    ///
    /// When the action returns `Ok` its level is committed, when it returns
    /// `Err` or panics its level is aborted. Levels share one fate: work of
    /// all levels is committed only if the outermost level commits, and an
    /// abort that ends the transaction discards everything.
    ///
    /// # Errors
    ///
    /// Returns the action's error, `DatabaseClosed` if the database is or
    /// becomes closed, or the engine error of begin or commit.
    pub fn run_transaction<T, F>(&self, action: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        self.transact(action)
    }

    /// Queues `action` to run in its own transaction.
    ///
    /// Queued actions always go through the queue, even when called from
    /// inside a transaction, and run one at a time in submission order on
    /// the drain thread. The returned [`Deferred`] resolves with the
    /// action's result, or rejects with its error. A panicking action
    /// rejects with `InvalidAction`.
    ///
    /// After [`close`](Self::close) the deferred is rejected immediately
    /// with `DatabaseClosed`.
    pub fn run_transaction_async<T, F>(&self, action: F) -> Deferred<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_closed() {
            return Deferred::rejected(CoreError::DatabaseClosed);
        }

        let (resolver, deferred) = deferred();
        let db = self.clone();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| db.transact(action)))
                .unwrap_or_else(|_| {
                    warn!("queued transaction panicked");
                    Err(CoreError::invalid_action("transaction action panicked"))
                });
            resolver.resolve(result);
        });

        match self.inner.queue.submit(job) {
            Ok(()) => deferred,
            Err(err) => Deferred::rejected(err),
        }
    }

    /// Begin, run, then commit or abort one level.
    fn transact<T, F>(&self, action: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        self.ensure_open()?;
        let slot = self.inner.slot.lock();
        let handle = TransactionHandle::begin(&mut slot.borrow_mut())?;

        let mut txn = Transaction::new(self, handle);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| action(&mut txn)));
        let mut handle = txn.into_handle();

        match outcome {
            Ok(Ok(value)) => {
                if !handle.finished() {
                    if self.is_closed() {
                        abort_level(&slot, &mut handle);
                        return Err(CoreError::DatabaseClosed);
                    }
                    handle.commit(&mut slot.borrow_mut())?;
                }
                Ok(value)
            }
            Ok(Err(err)) => {
                abort_level(&slot, &mut handle);
                Err(err)
            }
            Err(payload) => {
                abort_level(&slot, &mut handle);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Runs `f` on the coordinator while holding the write slot.
    pub(crate) fn with_coordinator<R>(
        &self,
        f: impl FnOnce(&mut TransactionCoordinator) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let slot = self.inner.slot.lock();
        let mut coordinator = slot.borrow_mut();
        f(&mut coordinator)
    }

    /// Returns true if a write transaction is open or the write slot is busy.
    ///
    /// On the thread holding the slot, or when the slot is free, this
    /// reports whether an engine write transaction is open. Never blocks:
    /// while another thread holds the slot the answer is `true`, even if
    /// that thread has already committed its outermost level and not yet
    /// returned.
    #[must_use]
    pub fn has_active_transaction(&self) -> bool {
        match self.inner.slot.try_lock() {
            Some(slot) => slot.borrow().has_active_transaction(),
            None => true,
        }
    }

    /// Returns the number of nested levels of the open transaction.
    ///
    /// Waits while another thread holds the write slot.
    #[must_use]
    pub fn nesting_depth(&self) -> u32 {
        self.inner.slot.lock().borrow().depth()
    }

    /// Returns the current generation.
    ///
    /// Waits while another thread holds the write slot.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.inner.slot.lock().borrow().generation()
    }

    /// Returns the number of queued requests that have not started.
    #[must_use]
    pub fn queued_requests(&self) -> usize {
        self.inner.queue.pending()
    }

    /// Blocks until every queued request has run.
    pub fn flush_queue(&self) {
        self.inner.queue.wait_idle();
    }

    /// Closes the database.
    ///
    /// An open transaction is aborted and its handles become stale. Queued
    /// requests that have not started reject with `DatabaseClosed`, as do
    /// all later calls. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the engine fails to close.
    pub fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            Err(CoreError::DatabaseClosed)
        } else {
            Ok(())
        }
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}

/// Aborts a level that did not finish itself. Failures are logged so they
/// do not replace the error that caused the abort.
fn abort_level(slot: &RefCell<TransactionCoordinator>, handle: &mut TransactionHandle) {
    if handle.finished() {
        return;
    }
    let mut coordinator = slot.borrow_mut();
    if coordinator.is_closed() {
        return;
    }
    if let Err(err) = handle.abort(&mut coordinator) {
        warn!(error = %err, generation = %handle.generation(), "abort failed");
    }
}

impl DatabaseInner {
    fn close(&self) -> CoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let slot = self.slot.lock();
        let result = slot.borrow_mut().close();
        debug!(pending = self.queue.pending(), "database closed");
        result
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("is_open", &self.is_open())
            .field("queued_requests", &self.queued_requests())
            .finish_non_exhaustive()
    }
}
