// crates/tablebatch-core/src/core/batching.rs
// ============================================================================
// Module: Tablebatch Partition Batcher
// Description: Partition grouping and size-limited sub-batch planning.
// Purpose: Turn a flat, sequence-ordered operation queue into ordered
//          per-partition sub-batches ready for atomic submission.
// Dependencies: serde, crate::core::{entity, mutation}
// ============================================================================

//! ## Overview
//! The store only accepts atomic operation groups that share one partition
//! key and contain at most [`MAX_GROUP_OPERATIONS`] operations. The planner
//! groups queued records by partition key, sorts each group by enqueue
//! sequence, and slices it into consecutive chunks within that limit.
//!
//! Sub-batches from one partition must be submitted in slice order. Partitions
//! themselves carry no mutual ordering guarantee (the store offers no
//! cross-partition atomicity); the planner emits them in ascending key order
//! purely so downstream behavior is deterministic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::PartitionKey;
use crate::core::mutation::OperationRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Hard upper bound on operations per atomic group, imposed by the store.
pub const MAX_GROUP_OPERATIONS: usize = 100;

// ============================================================================
// SECTION: Sub-Batches
// ============================================================================

/// One size-limited slice of a partition's ordered operations.
///
/// # Invariants
/// - `records` is non-empty, at most [`MAX_GROUP_OPERATIONS`] long, sorted by
///   ascending sequence, and homogeneous in partition key.
/// - `index` is the 0-based slice position within the partition; slices must
///   reach the store in index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBatch {
    /// Partition key shared by every record in the slice.
    pub partition_key: PartitionKey,
    /// 0-based slice position within the partition.
    pub index: usize,
    /// Ordered operation records in the slice.
    pub records: Vec<OperationRecord>,
}

impl SubBatch {
    /// Returns the number of operations in the slice.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when the slice holds no operations.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// SECTION: Planner
// ============================================================================

/// Plans per-partition, size-limited sub-batches from queued records.
///
/// Groups by partition key, sorts each group ascending by sequence, and
/// slices it into chunks of at most [`MAX_GROUP_OPERATIONS`] records. Chunk
/// `i` covers offsets `[i * 100, i * 100 + 100)` of the sorted group. Empty
/// input plans zero sub-batches; empty groups emit nothing.
#[must_use]
pub fn plan_batches(records: Vec<OperationRecord>) -> Vec<SubBatch> {
    let mut groups: BTreeMap<PartitionKey, Vec<OperationRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.partition_key().clone()).or_default().push(record);
    }

    let mut plan = Vec::new();
    for (partition_key, mut group) in groups {
        group.sort_by_key(|record| record.sequence);

        let mut index = 0;
        let mut chunk = Vec::with_capacity(MAX_GROUP_OPERATIONS.min(group.len()));
        for record in group {
            chunk.push(record);
            if chunk.len() == MAX_GROUP_OPERATIONS {
                plan.push(SubBatch {
                    partition_key: partition_key.clone(),
                    index,
                    records: std::mem::take(&mut chunk),
                });
                index += 1;
            }
        }
        if !chunk.is_empty() {
            plan.push(SubBatch {
                partition_key: partition_key.clone(),
                index,
                records: chunk,
            });
        }
    }
    plan
}
