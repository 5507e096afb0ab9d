// crates/tablebatch-core/src/runtime/writer.rs
// ============================================================================
// Module: Tablebatch Batch Writer
// Description: Queue plus mutation-intent API over the batched write engine.
// Purpose: Capture write intents from concurrent producers and execute them
//          as ordered, size-limited atomic groups.
// Dependencies: thiserror, crate::{core, interfaces, runtime::executor}
// ============================================================================

//! ## Overview
//! The writer owns one unbounded operation queue and one commit counter.
//! Callers enqueue mutation intents (singular or bulk) from any thread, then
//! call [`BatchWriter::execute`], which drains a point-in-time snapshot of
//! the queue, plans per-partition sub-batches, and submits them in plan
//! order. The first failed submission aborts the entire call; the raised
//! [`BatchError`] reports whether any sub-batch had already committed.
//!
//! Only one `execute` should be in flight per writer. Concurrent calls are
//! memory-safe (the drain is atomic) but split the queued records between
//! the two plans in an unspecified way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use thiserror::Error;

use crate::core::batching::plan_batches;
use crate::core::entity::EntityRecord;
use crate::core::entity::TableEntity;
use crate::core::mutation::MutationKind;
use crate::core::mutation::OperationRecord;
use crate::interfaces::PreconditionError;
use crate::interfaces::StoreError;
use crate::interfaces::TableStore;
use crate::runtime::executor::BatchExecutor;
use crate::runtime::executor::RetryPolicy;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure raised by a batched execute call, carrying consistency state.
///
/// # Invariants
/// - `is_consistent() == true` means the store holds no partial result from
///   this call and the whole operation may be retried from scratch.
/// - `is_consistent() == false` means partial work survived and naive retry
///   would re-apply committed mutations; manual reconciliation is required.
#[derive(Debug, Error, Clone)]
pub enum BatchError {
    /// A sub-batch submission failed; remaining work was abandoned.
    #[error("batch aborted after {committed} committed sub-batches: {source}")]
    Aborted {
        /// Number of sub-batches committed before the failure.
        committed: u64,
        /// Store failure that aborted the call.
        source: StoreError,
    },
    /// A sub-batch failed and every entity of the run was deleted to undo
    /// partial commits; the store is back in its pre-execute state.
    #[error("batch failed and was compensated ({rolled_back} deletes): {source}")]
    Compensated {
        /// Number of compensating deletes that removed an entity.
        rolled_back: u64,
        /// Store failure that triggered compensation.
        source: StoreError,
    },
    /// A sub-batch failed and a compensating delete also failed; the store
    /// may hold orphaned entities. This is an operational incident, not a
    /// retryable error.
    #[error("batch compensation failed: original error: {original}; compensation error: {compensation}")]
    CompensationFailed {
        /// Store failure that triggered compensation.
        original: StoreError,
        /// Store failure raised while compensating.
        compensation: StoreError,
    },
    /// The caller cancelled the run between sub-batch submissions.
    #[error("batch cancelled after {committed} committed sub-batches")]
    Cancelled {
        /// Number of sub-batches committed before cancellation.
        committed: u64,
    },
}

impl BatchError {
    /// Returns `true` when the store holds no partial result from the failed
    /// call, making a full retry safe.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        match self {
            Self::Aborted { committed, .. } | Self::Cancelled { committed } => *committed == 0,
            Self::Compensated { .. } => true,
            Self::CompensationFailed { .. } => false,
        }
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Outcome of a fully successful execute call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of sub-batches committed to the store.
    pub batches_committed: u64,
    /// Total number of operations applied across all sub-batches.
    pub operations_applied: u64,
}

// ============================================================================
// SECTION: Operation Queue
// ============================================================================

/// Concurrent producer queue shared by the writer variants.
///
/// # Invariants
/// - Sequence numbers strictly increase in enqueue order per queue instance.
/// - Draining takes a point-in-time snapshot; records are never re-enqueued.
#[derive(Debug, Default)]
pub(crate) struct OperationQueue {
    /// Queued operation records awaiting execution.
    records: Mutex<Vec<OperationRecord>>,
    /// Next sequence number to assign.
    sequence: AtomicU64,
}

impl OperationQueue {
    /// Serializes an entity and appends it to the queue with the next
    /// sequence number.
    pub(crate) fn push<E>(&self, mutation: MutationKind, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        let record = EntityRecord::from_entity(entity)
            .map_err(|e| PreconditionError::new(format!("entity is not storable: {e}")))?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.guard().push(OperationRecord {
            sequence,
            mutation,
            entity: record,
        });
        Ok(())
    }

    /// Returns the number of queued records.
    pub(crate) fn len(&self) -> usize {
        self.guard().len()
    }

    /// Drains the queue, returning a point-in-time snapshot of its contents.
    pub(crate) fn drain(&self) -> Vec<OperationRecord> {
        std::mem::take(&mut *self.guard())
    }

    /// Locks the queue, recovering from poisoning (queued records stay valid
    /// even if a producer panicked).
    fn guard(&self) -> std::sync::MutexGuard<'_, Vec<OperationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Batch Writer
// ============================================================================

/// Fail-fast batched writer over one table.
///
/// # Invariants
/// - Sub-batches of one partition reach the store strictly in slice order.
/// - The first failed submission aborts the call; no further sub-batches are
///   attempted in any partition.
pub struct BatchWriter {
    /// Retrying group executor bound to the target table.
    executor: BatchExecutor,
    /// Shared producer queue of pending operations.
    queue: OperationQueue,
}

impl fmt::Debug for BatchWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchWriter")
            .field("executor", &self.executor)
            .field("queue", &self.queue)
            .finish()
    }
}

impl BatchWriter {
    /// Creates a writer for one table with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            executor: BatchExecutor::with_policy_unchecked(store, table, RetryPolicy::default()),
            queue: OperationQueue::default(),
        }
    }

    /// Creates a writer for one table with an explicit retry policy.
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

    /// Creates a writer without validating the policy; callers must pass a
    /// policy that already satisfies the range invariants.
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

    /// Queues a delete of the entity.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn delete<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::Delete, entity)
    }

    /// Queues deletes of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn delete_all<E>(&self, entities: impl IntoIterator<Item = E>) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.delete(&entity)?;
        }
        Ok(())
    }

    /// Queues a merge into the entity's stored version.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn merge<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::Merge, entity)
    }

    /// Queues merges of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn merge_all<E>(&self, entities: impl IntoIterator<Item = E>) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.merge(&entity)?;
        }
        Ok(())
    }

    /// Queues a replace of the entity's stored version.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn replace<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::Replace, entity)
    }

    /// Queues replaces of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn replace_all<E>(&self, entities: impl IntoIterator<Item = E>) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.replace(&entity)?;
        }
        Ok(())
    }

    /// Queues an insert-or-merge of the entity.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn insert_or_merge<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::InsertOrMerge, entity)
    }

    /// Queues insert-or-merges of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn insert_or_merge_all<E>(
        &self,
        entities: impl IntoIterator<Item = E>,
    ) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.insert_or_merge(&entity)?;
        }
        Ok(())
    }

    /// Queues an insert-or-replace of the entity.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the entity is not storable.
    pub fn insert_or_replace<E>(&self, entity: &E) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        self.queue.push(MutationKind::InsertOrReplace, entity)
    }

    /// Queues insert-or-replaces of each entity in iteration order.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when an entity is not storable; earlier
    /// elements stay queued.
    pub fn insert_or_replace_all<E>(
        &self,
        entities: impl IntoIterator<Item = E>,
    ) -> Result<(), PreconditionError>
    where
        E: TableEntity + Serialize,
    {
        for entity in entities {
            self.insert_or_replace(&entity)?;
        }
        Ok(())
    }

    /// Returns the number of operations currently queued.
    #[must_use]
    pub fn pending_operations(&self) -> usize {
        self.queue.len()
    }

    /// Executes every queued operation as ordered atomic groups.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Aborted`] when a sub-batch submission fails;
    /// remaining sub-batches are not attempted.
    pub fn execute(&self) -> Result<BatchReport, BatchError> {
        self.run(None)
    }

    /// Executes queued operations, checking the cancellation flag between
    /// sub-batch submissions. In-flight submissions run to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Cancelled`] when the flag is raised, or
    /// [`BatchError::Aborted`] when a submission fails.
    pub fn execute_with_cancel(&self, cancel: &AtomicBool) -> Result<BatchReport, BatchError> {
        self.run(Some(cancel))
    }

    /// Drains the queue, plans sub-batches, and submits them in plan order.
    fn run(&self, cancel: Option<&AtomicBool>) -> Result<BatchReport, BatchError> {
        let plan = plan_batches(self.queue.drain());
        let mut committed: u64 = 0;
        let mut operations_applied: u64 = 0;
        for sub_batch in &plan {
            if let Some(flag) = cancel
                && flag.load(Ordering::SeqCst)
            {
                return Err(BatchError::Cancelled { committed });
            }
            match self.executor.execute(sub_batch) {
                Ok(_) => {
                    committed += 1;
                    operations_applied += u64::try_from(sub_batch.len()).unwrap_or(u64::MAX);
                }
                Err(source) => return Err(BatchError::Aborted { committed, source }),
            }
        }
        Ok(BatchReport {
            batches_committed: committed,
            operations_applied,
        })
    }
}
