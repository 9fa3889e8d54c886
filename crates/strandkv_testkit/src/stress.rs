//! Stress tests for strandkv.
//!
//! These helpers hammer the write slot and the queue from several threads
//! and report how many transactions went through.

use crate::fixtures::TEST_COLLECTION;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use strandkv_core::{CoreResult, Database, Transaction};
use tracing::info;

/// Key of the shared counter the stress helpers increment.
pub const COUNTER_KEY: &[u8] = b"counter";

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Logs the run at `INFO` under `name`.
    pub fn log_summary(&self, name: &str) {
        info!(
            run = name,
            total = self.total_ops,
            successful = self.successful_ops,
            failed = self.failed_ops,
            duration = ?self.duration,
            ops_per_second = self.ops_per_second,
            "stress run finished"
        );
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Nesting depth of each transaction.
    pub nesting: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            nesting: 1,
        }
    }
}

/// Increments the shared counter inside `txn`.
///
/// # Errors
///
/// Returns the transaction's error.
pub fn increment_counter(txn: &Transaction<'_>) -> CoreResult<u64> {
    let collection = txn.collection(TEST_COLLECTION)?;
    let current = txn
        .get(&collection, COUNTER_KEY)?
        .map_or(0, |bytes| decode_counter(&bytes));
    let next = current + 1;
    txn.put(&collection, COUNTER_KEY, &next.to_be_bytes())?;
    Ok(next)
}

/// Reads the shared counter.
pub fn read_counter(db: &Database) -> u64 {
    db.run_transaction(|txn| {
        let collection = txn.collection(TEST_COLLECTION)?;
        Ok(txn
            .get(&collection, COUNTER_KEY)?
            .map_or(0, |bytes| decode_counter(&bytes)))
    })
    .expect("Failed to read counter")
}

fn decode_counter(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[8 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    u64::from_be_bytes(buf)
}

/// Runs an increment nested `depth` levels deep; the innermost level
/// does the work.
fn nested_increment(db: &Database, depth: u32) -> CoreResult<u64> {
    db.run_transaction(|txn| {
        if depth <= 1 {
            increment_counter(txn)
        } else {
            nested_increment(txn.database(), depth - 1)
        }
    })
}

/// Increments the counter from several threads with synchronous
/// transactions.
pub fn stress_concurrent_increments(db: &Database, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..config.operations {
                    match nested_increment(db, config.nesting) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    result.log_summary("concurrent_increments");
    result
}

/// Increments the counter from several threads through the queue.
///
/// Each thread checks that the counter values its own requests observed
/// are strictly increasing, which holds only if the queue preserves
/// submission order.
pub fn stress_queued_increments(db: &Database, config: &StressConfig) -> StressTestResult {
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                let deferreds: Vec<_> = (0..config.operations)
                    .map(|_| db.run_transaction_async(|txn| increment_counter(txn)))
                    .collect();

                let mut last = 0;
                for deferred in deferreds {
                    match deferred.wait() {
                        Ok(value) if value > last => {
                            last = value;
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    result.log_summary("queued_increments");
    result
}
