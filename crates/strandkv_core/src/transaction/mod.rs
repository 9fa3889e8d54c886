//! Nested transactions on a single-writer engine.
//!
//! strandkv maps any number of nested logical transactions onto the one
//! write transaction the engine offers:
//! - **Reference counting**: only the outermost level opens and ends the
//!   engine transaction
//! - **Fate sharing**: the level that brings the depth to zero commits or
//!   aborts the work of all levels
//! - **Generations**: handles from an ended transaction are rejected

mod coordinator;
mod handle;

pub use coordinator::TransactionCoordinator;
pub use handle::TransactionHandle;
