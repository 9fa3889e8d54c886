//! Property-based test generators using proptest.
//!
//! Provides strategies for generating nesting shapes, submission
//! latencies and key-value data, plus models that say what a run must
//! leave behind.

use crate::fixtures::TEST_COLLECTION;
use proptest::prelude::*;
use strandkv_core::{CoreError, CoreResult, Database};

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..32)
}

/// Strategy for generating values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for per-request latencies (milliseconds) of queued requests.
pub fn latency_strategy(max_requests: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..3, 1..max_requests)
}

/// How a nesting level ends once its children have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelOutcome {
    /// The action returns `Ok`.
    Commit,
    /// The action returns `Err`.
    Fail,
}

/// A tree of nested `run_transaction` calls.
///
/// Every level writes one key, runs all its children in order and then
/// ends with its outcome. The first child error is either propagated or
/// swallowed, as chosen per level.
#[derive(Debug, Clone)]
pub struct NestingShape {
    /// How this level ends.
    pub outcome: LevelOutcome,
    /// Whether child errors are ignored instead of propagated.
    pub swallow_child_errors: bool,
    /// Nested levels.
    pub children: Vec<NestingShape>,
}

impl NestingShape {
    /// Returns the number of levels in the tree.
    #[must_use]
    pub fn levels(&self) -> usize {
        1 + self.children.iter().map(NestingShape::levels).sum::<usize>()
    }

    /// Returns the depth of the tree.
    #[must_use]
    pub fn depth(&self) -> u32 {
        1 + self.children.iter().map(NestingShape::depth).max().unwrap_or(0)
    }

    /// Returns whether this level's action returns `Ok`.
    #[must_use]
    pub fn succeeds(&self) -> bool {
        let children_ok = self.swallow_child_errors || self.children.iter().all(Self::succeeds);
        children_ok && self.outcome == LevelOutcome::Commit
    }

    /// Runs the tree against `db`, writing key `level_<n>` (preorder) at
    /// every level. Returns the deepest nesting depth observed.
    ///
    /// # Errors
    ///
    /// Returns the outermost level's error.
    pub fn run(&self, db: &Database) -> CoreResult<u32> {
        let mut next_level = 0;
        let mut max_depth = 0;
        self.run_level(db, &mut next_level, &mut max_depth)?;
        Ok(max_depth)
    }

    fn run_level(
        &self,
        db: &Database,
        next_level: &mut usize,
        max_depth: &mut u32,
    ) -> CoreResult<()> {
        db.run_transaction(|txn| {
            let level = *next_level;
            *next_level += 1;
            *max_depth = (*max_depth).max(txn.database().nesting_depth());

            let collection = txn.collection(TEST_COLLECTION)?;
            txn.put(&collection, level_key(level).as_bytes(), b"written")?;

            let mut child_error = None;
            for child in &self.children {
                if let Err(err) = child.run_level(txn.database(), next_level, max_depth) {
                    child_error.get_or_insert(err);
                }
            }
            if let Some(err) = child_error.filter(|_| !self.swallow_child_errors) {
                return Err(err);
            }

            match self.outcome {
                LevelOutcome::Commit => Ok(()),
                LevelOutcome::Fail => Err(CoreError::aborted(format!("level {level} fails"))),
            }
        })
    }
}

/// Returns the key written by the level with preorder index `level`.
#[must_use]
pub fn level_key(level: usize) -> String {
    format!("level_{level}")
}

/// Strategy for level outcomes (failures are rarer).
pub fn level_outcome_strategy() -> impl Strategy<Value = LevelOutcome> {
    prop_oneof![
        3 => Just(LevelOutcome::Commit),
        1 => Just(LevelOutcome::Fail),
    ]
}

/// Strategy for nesting trees up to `max_depth` levels deep.
pub fn nesting_shape_strategy(max_depth: u32) -> impl Strategy<Value = NestingShape> {
    let leaf = (level_outcome_strategy(), any::<bool>()).prop_map(|(outcome, swallow)| {
        NestingShape {
            outcome,
            swallow_child_errors: swallow,
            children: Vec::new(),
        }
    });
    leaf.prop_recursive(max_depth.saturating_sub(1), 16, 3, |inner| {
        (
            level_outcome_strategy(),
            any::<bool>(),
            prop::collection::vec(inner, 0..3),
        )
            .prop_map(|(outcome, swallow, children)| NestingShape {
                outcome,
                swallow_child_errors: swallow,
                children,
            })
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
