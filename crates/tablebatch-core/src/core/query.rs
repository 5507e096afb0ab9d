// crates/tablebatch-core/src/core/query.rs
// ============================================================================
// Module: Tablebatch Queries
// Description: Key-based query shapes for segmented table enumeration.
// Purpose: Express the supported listing filters without a query language.
// Dependencies: serde, crate::core::entity
// ============================================================================

//! ## Overview
//! The store exposes key-addressed enumeration only; this module defines the
//! three supported filter shapes (everything, one partition, one exact key)
//! plus an optional result cap. Building a general predicate or query
//! language is explicitly out of scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::entity::EntityKey;
use crate::core::entity::PartitionKey;

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Key-based filter applied during segmented enumeration.
///
/// # Invariants
/// - Matching is exact value equality on the keys; no prefix or range
///   semantics are implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Match every entity in the table.
    All,
    /// Match entities in one partition.
    PartitionKeyEq {
        /// Partition key to match.
        partition_key: PartitionKey,
    },
    /// Match one exact entity key.
    KeyEq {
        /// Entity key to match.
        key: EntityKey,
    },
}

impl QueryFilter {
    /// Returns `true` when the filter matches the given key.
    #[must_use]
    pub fn matches(&self, key: &EntityKey) -> bool {
        match self {
            Self::All => true,
            Self::PartitionKeyEq { partition_key } => key.partition_key == *partition_key,
            Self::KeyEq { key: wanted } => key == wanted,
        }
    }
}

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Segmented enumeration request.
///
/// # Invariants
/// - `take`, when set, caps the number of results per returned page; it never
///   changes which entities match. `Some(0)` is rejected as a precondition
///   violation at execution call sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableQuery {
    /// Filter selecting the matching entities.
    pub filter: QueryFilter,
    /// Optional per-page result cap.
    pub take: Option<usize>,
}

impl TableQuery {
    /// Creates a query matching every entity.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            filter: QueryFilter::All,
            take: None,
        }
    }

    /// Creates a query matching one partition.
    #[must_use]
    pub fn by_partition_key(partition_key: impl Into<PartitionKey>) -> Self {
        Self {
            filter: QueryFilter::PartitionKeyEq {
                partition_key: partition_key.into(),
            },
            take: None,
        }
    }

    /// Creates a query matching one exact entity key.
    #[must_use]
    pub const fn by_key(key: EntityKey) -> Self {
        Self {
            filter: QueryFilter::KeyEq { key },
            take: None,
        }
    }

    /// Returns the query with a per-page result cap applied.
    #[must_use]
    pub const fn with_take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}
