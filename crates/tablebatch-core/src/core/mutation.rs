// crates/tablebatch-core/src/core/mutation.rs
// ============================================================================
// Module: Tablebatch Mutation Intents
// Description: Mutation kinds and sequenced operation records.
// Purpose: Capture write intent without executing it, preserving enqueue
//          order for later batched submission.
// Dependencies: serde, crate::core::entity
// ============================================================================

//! ## Overview
//! A queued write is an immutable triple of entity, desired mutation, and
//! sequence number. The sequence number strictly increases in enqueue order
//! per writer instance and is the only carrier of intra-partition ordering:
//! partition grouping is by key equality, so without explicit sequencing two
//! mutations of the same entity could reach the store in the wrong order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::EntityRecord;
use crate::core::entity::PartitionKey;

// ============================================================================
// SECTION: Mutation Kinds
// ============================================================================

/// Desired mutation for one entity.
///
/// # Invariants
/// - Variants map 1:1 to the store's native single-entity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// Insert a new entity; fails if the key already exists.
    Insert,
    /// Delete an existing entity; fails if the key is absent.
    Delete,
    /// Merge properties into an existing entity; fails if the key is absent.
    Merge,
    /// Replace an existing entity; fails if the key is absent.
    Replace,
    /// Insert the entity, or merge properties if the key already exists.
    InsertOrMerge,
    /// Insert the entity, or replace it if the key already exists.
    InsertOrReplace,
}

impl MutationKind {
    /// Returns a stable lowercase label for the mutation kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::InsertOrMerge => "insert_or_merge",
            Self::InsertOrReplace => "insert_or_replace",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Operation Records
// ============================================================================

/// One queued write: entity, desired mutation, and enqueue sequence.
///
/// # Invariants
/// - `sequence` strictly increases in enqueue order per writer instance.
/// - Records are immutable once enqueued; execution drains them, it never
///   mutates them in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Enqueue sequence number establishing intra-partition order.
    pub sequence: u64,
    /// Desired mutation.
    pub mutation: MutationKind,
    /// Store-native entity record the mutation applies to.
    pub entity: EntityRecord,
}

impl OperationRecord {
    /// Returns the partition key targeted by this record.
    #[must_use]
    pub const fn partition_key(&self) -> &PartitionKey {
        &self.entity.key.partition_key
    }
}
