//! Transaction handle lifecycle.

use crate::error::{CoreError, CoreResult};
use crate::transaction::coordinator::TransactionCoordinator;
use crate::types::Generation;

/// One logical, possibly nested, transaction request.
///
/// A handle remembers the generation it was opened in and whether it has
/// been finished. `commit` and `abort` run at most once; the handle is
/// finished afterwards even if the coordinator call failed.
#[derive(Debug)]
pub struct TransactionHandle {
    generation: Generation,
    finished: bool,
}

impl TransactionHandle {
    /// Begins a logical transaction on `coordinator`.
    ///
    /// # Errors
    ///
    /// Returns the coordinator's begin error.
    pub fn begin(coordinator: &mut TransactionCoordinator) -> CoreResult<Self> {
        let generation = coordinator.begin()?;
        Ok(Self {
            generation,
            finished: false,
        })
    }

    /// Returns the generation this handle belongs to.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Returns true once `commit` or `abort` has been called.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Fails with `StaleTransaction` unless the handle may still be used.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn ensure_current(&self, coordinator: &TransactionCoordinator) -> CoreResult<()> {
        if self.finished {
            return Err(CoreError::stale(self.generation, coordinator.generation()));
        }
        coordinator.check_generation(self.generation)
    }

    /// Commits this level.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if the handle is finished or outdated, or
    /// the engine error of the final commit.
    pub fn commit(&mut self, coordinator: &mut TransactionCoordinator) -> CoreResult<()> {
        self.finish(coordinator, TransactionCoordinator::commit)
    }

    /// Aborts this level.
    ///
    /// # Errors
    ///
    /// Returns `StaleTransaction` if the handle is finished or outdated, or
    /// the engine error of the final abort.
    pub fn abort(&mut self, coordinator: &mut TransactionCoordinator) -> CoreResult<()> {
        self.finish(coordinator, TransactionCoordinator::abort)
    }

    fn finish(
        &mut self,
        coordinator: &mut TransactionCoordinator,
        end: fn(&mut TransactionCoordinator, Generation) -> CoreResult<()>,
    ) -> CoreResult<()> {
        if self.finished {
            return Err(CoreError::stale(self.generation, coordinator.generation()));
        }
        let result = end(coordinator, self.generation);
        self.finished = true;
        result
    }
}
