//! Single-consumer FIFO drain queue.

use crate::error::{CoreError, CoreResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, trace, warn};

/// A unit of queued work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    /// Jobs not yet started, oldest first.
    pending: VecDeque<Job>,
    /// True while a drain loop is running.
    draining: bool,
    /// Thread running the drain loop, if any.
    worker: Option<ThreadId>,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when the drain loop goes idle.
    idle: Condvar,
}

/// FIFO queue drained by at most one worker thread at a time.
///
/// ## State machine
///
/// ```text
/// idle --submit--> draining --queue empty--> idle
/// ```
///
/// Submitting to an idle queue spawns a drain loop; submitting while one
/// runs only appends. The loop runs each job to completion before it pops
/// the next, and exits once the queue is empty.
pub struct DrainQueue {
    shared: Arc<Shared>,
    thread_name: String,
}

impl DrainQueue {
    /// Creates an idle queue whose drain threads get `thread_name`.
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    draining: false,
                    worker: None,
                }),
                idle: Condvar::new(),
            }),
            thread_name: thread_name.into(),
        }
    }

    /// Appends a job, starting a drain loop if none is running.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the drain thread cannot be spawned; the job is
    /// dropped in that case.
    pub fn submit(&self, job: Job) -> CoreResult<()> {
        let mut state = self.shared.state.lock();
        state.pending.push_back(job);
        trace!(pending = state.pending.len(), "transaction queued");
        if state.draining {
            return Ok(());
        }

        // The queue was empty before this push, and the new drain loop
        // cannot pop until the lock is released.
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || drain(&shared));
        match spawned {
            Ok(_) => {
                state.draining = true;
                Ok(())
            }
            Err(err) => {
                state.pending.clear();
                Err(CoreError::Io(err))
            }
        }
    }

    /// Blocks until no drain loop is running.
    ///
    /// Returns immediately when called from a queued job. Calling it while
    /// holding the write slot that a queued job waits for never returns.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        if state.worker == Some(thread::current().id()) {
            return;
        }
        while state.draining {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Returns the number of jobs not yet started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Returns true while a drain loop is running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.shared.state.lock().draining
    }
}

fn drain(shared: &Shared) {
    shared.state.lock().worker = Some(thread::current().id());
    debug!("drain loop started");
    loop {
        let job = {
            let mut state = shared.state.lock();
            match state.pending.pop_front() {
                Some(job) => job,
                None => {
                    state.draining = false;
                    state.worker = None;
                    shared.idle.notify_all();
                    break;
                }
            }
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("queued job panicked");
        }
    }
    debug!("drain loop idle");
}

impl std::fmt::Debug for DrainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DrainQueue")
            .field("thread_name", &self.thread_name)
            .field("pending", &state.pending.len())
            .field("draining", &state.draining)
            .finish()
    }
}
