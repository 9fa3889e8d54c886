//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use strandkv_core::{CoreResult, Database};

/// Collection the benchmarks write to.
pub const BENCH_COLLECTION: &str = "bench";

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct big-endian keys.
pub fn sequential_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count as u64).map(|i| i.to_be_bytes().to_vec()).collect()
}

/// Writes `count` keys with `value_size`-byte random values in one
/// transaction and returns the keys.
///
/// # Errors
///
/// Returns the transaction's error.
pub fn populate(db: &Database, count: usize, value_size: usize) -> CoreResult<Vec<Vec<u8>>> {
    let keys = sequential_keys(count);
    db.run_transaction(|txn| {
        let collection = txn.collection(BENCH_COLLECTION)?;
        for key in &keys {
            txn.put(&collection, key, &random_data(value_size))?;
        }
        Ok(())
    })?;
    Ok(keys)
}

/// Runs an empty transaction nested `depth` levels deep.
///
/// # Errors
///
/// Returns the transaction's error.
pub fn nested_noop(db: &Database, depth: u32) -> CoreResult<()> {
    db.run_transaction(|txn| {
        if depth > 1 {
            nested_noop(txn.database(), depth - 1)
        } else {
            Ok(())
        }
    })
}
