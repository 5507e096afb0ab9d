// crates/tablebatch-core/src/interfaces/mod.rs
// ============================================================================
// Module: Tablebatch Interfaces
// Description: Backend-agnostic store boundary and caller-contract errors.
// Purpose: Define the contract surface concrete table stores implement.
// Dependencies: serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! The store boundary is consumed, not re-specified: a concrete store accepts
//! single operations and same-partition atomic operation groups, enforces a
//! per-group size limit, and exposes segmented enumeration with continuation
//! cursors. Implementations must apply groups all-or-nothing; partial-group
//! application is impossible by construction of the contract.
//!
//! All calls are blocking from the caller's perspective; no scheduler is
//! assumed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::entity::EntityKey;
use crate::core::entity::EntityRecord;
use crate::core::entity::Etag;
use crate::core::mutation::MutationKind;
use crate::core::paging::ContinuationToken;
use crate::core::query::TableQuery;

// ============================================================================
// SECTION: Caller-Contract Errors
// ============================================================================

/// Caller passed an absent or out-of-range required argument.
///
/// # Invariants
/// - Always raised synchronously at the violating call, never deferred to
///   execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("precondition violated: {message}")]
pub struct PreconditionError {
    /// Description of the violated precondition.
    message: String,
}

impl PreconditionError {
    /// Creates a new precondition violation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Errors reported by a concrete table store.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Transient` is the only retryable class; everything else is terminal
///   for the submission that raised it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Addressed entity or table does not exist.
    #[error("store entity not found: {0}")]
    NotFound(String),
    /// Insert targeted a key that already exists.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Version tag did not match the stored version.
    #[error("store precondition failed: {0}")]
    PreconditionFailed(String),
    /// Atomic group refused; `index` is the offending operation's position.
    #[error("store rejected group at operation {index}: {message}")]
    GroupRejected {
        /// 0-based index of the operation that caused the rejection.
        index: usize,
        /// Store-reported rejection reason.
        message: String,
    },
    /// Group violated the submission contract (empty, oversized, or
    /// spanning multiple partitions).
    #[error("invalid operation group: {0}")]
    InvalidGroup(String),
    /// Transient store fault; safe to retry the same submission.
    #[error("store transient failure: {0}")]
    Transient(String),
    /// Request was invalid for a non-group reason.
    #[error("store invalid request: {0}")]
    Invalid(String),
    /// Store I/O failure.
    #[error("store io error: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns `true` when retrying the same submission may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` when the error reports an absent entity or table.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// SECTION: Wire Units
// ============================================================================

/// One store-native operation inside a submission.
///
/// # Invariants
/// - Order within a group is preserved end to end by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOperation {
    /// Mutation to apply.
    pub mutation: MutationKind,
    /// Entity the mutation applies to.
    pub entity: EntityRecord,
}

/// One page of store-native records from a segmented query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSegment {
    /// Records in this segment, in ascending key order.
    pub records: Vec<EntityRecord>,
    /// Cursor for the next segment, if more records match.
    pub continuation: Option<ContinuationToken>,
}

// ============================================================================
// SECTION: Table Store
// ============================================================================

/// Backend-agnostic partitioned table store.
///
/// Implementations must apply submitted groups atomically: either every
/// operation in the group takes effect or none does.
pub trait TableStore: Send + Sync {
    /// Submits an ordered, same-partition operation group atomically.
    ///
    /// Returns the new version tag of each written entity, in operation
    /// order (deletes yield their last stored tag).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidGroup`] for empty, oversized, or
    /// mixed-partition groups, and the store's native failure when any
    /// operation is refused.
    fn submit_atomic_group(
        &self,
        table: &str,
        operations: &[StoreOperation],
    ) -> Result<Vec<Etag>, StoreError>;

    /// Applies one single-entity operation outside any group.
    ///
    /// Returns the new version tag for writes, `None` for deletes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the operation is refused.
    fn apply_one(&self, table: &str, operation: &StoreOperation) -> Result<Option<Etag>, StoreError>;

    /// Retrieves one entity by its full key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails; an absent entity is
    /// `Ok(None)`, not an error.
    fn retrieve(&self, table: &str, key: &EntityKey) -> Result<Option<EntityRecord>, StoreError>;

    /// Returns one page of entities matching the query.
    ///
    /// `page_size` caps the page; the query's own `take` may cap it further.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when enumeration fails.
    fn query_segment(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<StoreSegment, StoreError>;

    /// Creates the table when it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when creation fails.
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError>;

    /// Deletes the table when it exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when deletion fails.
    fn delete_table(&self, table: &str) -> Result<(), StoreError>;
}
