// crates/tablebatch-core/src/runtime/executor.rs
// ============================================================================
// Module: Tablebatch Batch Executor
// Description: Retrying submission of one atomic operation group at a time.
// Purpose: Absorb transient store faults behind a bounded exponential
//          backoff without changing submission semantics.
// Dependencies: serde, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The executor converts one planned sub-batch into store-native operations,
//! preserving order, and submits them as a single atomic group. Transient
//! store faults are retried with bounded exponential backoff; every other
//! failure propagates unchanged. The backoff curve is a tunable, not a
//! contract: the defaults (2ms initial delay, 100 attempts) absorb brief
//! throttling without a user-visible delay explosion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::core::batching::SubBatch;
use crate::core::entity::Etag;
use crate::interfaces::PreconditionError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreOperation;
use crate::interfaces::TableStore;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded exponential backoff configuration for store submissions.
///
/// # Invariants
/// - `max_attempts` >= 1; attempt 1 is the initial submission.
/// - `initial_backoff_ms` >= 1; the delay doubles per retry up to
///   `max_backoff_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Maximum number of submission attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Upper bound on any single backoff delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Returns the default initial backoff in milliseconds.
const fn default_initial_backoff_ms() -> u64 {
    2
}

/// Returns the default maximum attempt count.
const fn default_max_attempts() -> u32 {
    100
}

/// Returns the default backoff cap in milliseconds.
const fn default_max_backoff_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_attempts: default_max_attempts(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries; useful in tests.
    #[must_use]
    pub const fn no_retries() -> Self {
        Self {
            initial_backoff_ms: 1,
            max_attempts: 1,
            max_backoff_ms: 1,
        }
    }

    /// Validates the policy's range invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when a field is out of range.
    pub fn validate(&self) -> Result<(), PreconditionError> {
        if self.max_attempts == 0 {
            return Err(PreconditionError::new("max_attempts must be greater than zero"));
        }
        if self.initial_backoff_ms == 0 {
            return Err(PreconditionError::new(
                "initial_backoff_ms must be greater than zero",
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(PreconditionError::new(
                "max_backoff_ms must be at least initial_backoff_ms",
            ));
        }
        Ok(())
    }

    /// Returns the initial backoff as a duration.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Returns the backoff cap as a duration.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// ============================================================================
// SECTION: Batch Executor
// ============================================================================

/// Submits planned sub-batches to one table with retry resilience.
///
/// # Invariants
/// - Operation order inside a sub-batch is preserved into the wire group.
/// - Only [`StoreError::Transient`] failures are retried.
#[derive(Clone)]
pub struct BatchExecutor {
    /// Store the executor submits against.
    store: Arc<dyn TableStore>,
    /// Target table name.
    table: String,
    /// Retry configuration for submissions.
    policy: RetryPolicy,
}

impl fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("table", &self.table)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor {
    /// Creates an executor for one table with the given retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the policy is out of range.
    pub fn new(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, PreconditionError> {
        policy.validate()?;
        Ok(Self::with_policy_unchecked(store, table, policy))
    }

    /// Creates an executor without validating the policy; callers must pass
    /// a policy that already satisfies the range invariants.
    pub(crate) fn with_policy_unchecked(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            table: table.into(),
            policy,
        }
    }

    /// Returns the table this executor submits to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the store this executor submits against.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Submits one sub-batch as a single atomic group.
    ///
    /// Returns normally only when the store accepted the whole group.
    ///
    /// # Errors
    ///
    /// Returns the store's native failure once transient retries are
    /// exhausted or a non-transient failure occurs.
    pub fn execute(&self, sub_batch: &SubBatch) -> Result<Vec<Etag>, StoreError> {
        let operations: Vec<StoreOperation> = sub_batch
            .records
            .iter()
            .map(|record| StoreOperation {
                mutation: record.mutation,
                entity: record.entity.clone(),
            })
            .collect();
        self.run_with_retries(|| self.store.submit_atomic_group(&self.table, &operations))
    }

    /// Applies one single-entity operation with the same retry policy.
    ///
    /// # Errors
    ///
    /// Returns the store's native failure once transient retries are
    /// exhausted or a non-transient failure occurs.
    pub fn apply_one(&self, operation: &StoreOperation) -> Result<Option<Etag>, StoreError> {
        self.run_with_retries(|| self.store.apply_one(&self.table, operation))
    }

    /// Runs a store call under the bounded exponential backoff policy.
    pub(crate) fn run_with_retries<T>(
        &self,
        call: impl Fn() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut delay = self.policy.initial_backoff();
        let mut attempt: u32 = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.policy.max_attempts => {
                    thread::sleep(delay);
                    delay = delay.saturating_mul(2).min(self.policy.max_backoff());
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
