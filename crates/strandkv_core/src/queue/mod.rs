//! Asynchronous transaction requests.
//!
//! Queued requests run one at a time, strictly in submission order, on a
//! dedicated drain thread. Each request hands its caller a [`Deferred`]
//! that resolves with the request's result.

mod deferred;
mod drain;

pub use deferred::Deferred;
pub(crate) use deferred::deferred;
pub use drain::{DrainQueue, Job};
