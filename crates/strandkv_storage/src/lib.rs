//! # strandkv Storage
//!
//! Single-writer storage engine abstraction for strandkv.
//!
//! This crate provides the lowest layer of strandkv: an engine that owns one
//! mutable write-transaction slot and exposes begin/commit/abort plus
//! key-value operations on named collections. Engines do not nest or queue
//! transactions; the coordinator in `strandkv_core` does that.
//!
//! ## Design Principles
//!
//! - One write transaction at a time, no nesting inside the engine
//! - Collections are addressed by handles that can go stale
//! - Must be `Send` so the coordinator can move between threads
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - For testing and ephemeral stores
//! - [`FaultInjectingEngine`] - Wrapper that fails transaction primitives on demand
//!
//! ## Example
//!
//! ```rust
//! use strandkv_storage::{CollectionOptions, InMemoryEngine, StorageEngine};
//!
//! let mut engine = InMemoryEngine::new();
//! let default = engine.open_collection(None, CollectionOptions::new()).unwrap();
//! engine.begin().unwrap();
//! engine.put(&default, b"key", b"value").unwrap();
//! engine.commit().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod engine;
mod error;
mod faults;
mod memory;

pub use collection::{CollectionHandle, CollectionId, CollectionOptions};
pub use engine::{EngineConfig, StorageEngine};
pub use error::{StorageError, StorageResult};
pub use faults::{FaultInjectingEngine, FaultPlan, FaultPoint};
pub use memory::InMemoryEngine;
