//! # strandkv Testkit
//!
//! Test utilities for strandkv.
//!
//! This crate provides:
//! - Test fixtures and database helpers, including fault-injecting databases
//! - Property-based test generators using proptest
//! - Stress testing utilities for the write slot and the queue
//! - Log setup and capture for tests
//!
//! ## Usage
//!
//! ```rust
//! use strandkv_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let value = db.run_transaction(|txn| increment_counter(txn)).unwrap();
//!     assert_eq!(value, 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stress::*;
