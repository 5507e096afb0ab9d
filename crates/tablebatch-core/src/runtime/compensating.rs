// crates/tablebatch-core/src/runtime/compensating.rs
// ============================================================================
// Module: Tablebatch Compensating Batch Writer
// Description: Insert-only batched writer with delete-on-failure rollback.
// Purpose: Trade availability for consistency by undoing partial partition
//          commits instead of merely reporting them.
// Dependencies: thiserror, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The store offers no cross-partition atomicity, so a multi-partition run
//! can fail after some partitions committed. This writer restricts itself to
//! inserts and, on any batch failure, deletes every entity that was part of
//! the run; deleting is a safe compensating action only for inserts, which
//! is why merge, replace, and delete intents are deliberately excluded
//! (deleting an already-merged or already-replaced entity would destroy data
//! that existed before the batch).
//!
//! A delete that fails because the entity was never created counts as
//! success. Any other delete failure leaves the store in an explicitly
//! unknown state and is surfaced as [`BatchError::CompensationFailed`], the
//! one unrecoverable outcome in the design.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::batching::plan_batches;
use crate::core::entity::TableEntity;
use crate::core::mutation::MutationKind;
use crate::core::mutation::OperationRecord;
use crate::interfaces::PreconditionError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreOperation;
use crate::interfaces::TableStore;
use crate::runtime::executor::BatchExecutor;
use crate::runtime::executor::RetryPolicy;
use crate::runtime::writer::BatchError;
use crate::runtime::writer::BatchReport;
use crate::runtime::writer::OperationQueue;

// ============================================================================
// SECTION: Compensating Batch Writer
// ============================================================================

/// Insert-only batched writer that rolls back partial commits on failure.
///
/// # Invariants
/// - Only insert intents can be queued.
/// - After a failed execute, either every entity of the run has been deleted
///   (consistent) or a compensation failure is reported (inconsistent).
pub struct CompensatingBatchWriter {
    /// Retrying group executor bound to the target table.
    executor: BatchExecutor,
    /// Shared producer queue of pending inserts.
    queue: OperationQueue,
}

impl fmt::Debug for CompensatingBatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensatingBatchWriter")
            .field("executor", &self.executor)
            .field("queue", &self.queue)
            .finish()
    }
}

impl CompensatingBatchWriter {
    /// Creates a compensating writer for one table with the default retry
    /// policy.
    #[must_use]
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            executor: BatchExecutor::with_policy_unchecked(store, table, RetryPolicy::default()),
            queue: OperationQueue::default(),
        }
    }

    /// Creates a compensating writer with an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the policy is out of range.
    pub fn with_retry_policy(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, PreconditionError> {
        Ok(Self {
            executor: BatchExecutor::new(store, table, policy)?,
            queue: OperationQueue::default(),
        })
    }

    /// Creates a compensating writer without validating the policy; callers
    /// must pass a policy that already satisfies the range invariants.
    pub(crate) fn with_policy_unchecked(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            executor: BatchExecutor::with_policy_unchecked(store, table, policy),
            queue: OperationQueue::default(),
        }
    }

    /// Queues an insert of the entity.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn insert<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::Insert, entity)
    }

    /// Queues inserts of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn insert_all<E>(&self, entities: impl IntoIterator<Item = E>) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.insert(&entity)?;
        }
        Ok(())
    }

    /// Returns the number of operations currently queued.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    /// Executes every queued insert as ordered atomic groups, deleting all
    /// entities of the run if any sub-batch fails.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Compensated`] when a submission failed but the
    /// rollback restored the pre-execute state, and
    /// [`BatchError::CompensationFailed`] when the rollback itself failed.
    pub fn execute(&self) -> Result<BatchReport, BatchError> {
        let drained = self.queue.drain();
        let plan = plan_batches(drained.clone());
        let mut committed: u64 = 0;
        let mut operations_applied: u64 = 0;
        for sub_batch in &plan {
            match self.executor.execute(sub_batch) {
                Ok(_) => {
                    committed += 1;
                    operations_applied += u64::try_from(sub_batch.len()).unwrap_or(u64::MAX);
                }
                Err(source) => return Err(self.compensate(&drained, source)),
            }
        }
        Ok(BatchReport {
            batches_committed: committed,
            operations_applied,
        })
    }

    /// Deletes every entity of the failed run, one at a time.
    ///
    /// Deletes use the wildcard version tag; a not-found response means the
    /// entity never committed and counts as success.
    fn compensate(&self, records: &[OperationRecord], original: StoreError) -> BatchError {
        let mut rolled_back: u64 = 0;
        for record in records {
            let delete = StoreOperation {
                mutation: MutationKind::Delete,
                entity: record.entity.with_wildcard_etag(),
            };
            match self.executor.apply_one(&delete) {
                Ok(_) => rolled_back += 1,
                Err(error) if error.is_not_found() => {}
                Err(compensation) => {
                    return BatchError::CompensationFailed {
                        original,
                        compensation,
                    };
                }
            }
        }
        BatchError::Compensated {
            rolled_back,
            source: original,
        }
    }
}
