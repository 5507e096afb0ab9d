// crates/tablebatch-core/src/core/mod.rs
// ============================================================================
// Module: Tablebatch Core Types
// Description: Canonical entity, mutation, batching, query, and paging types.
// Purpose: Provide stable, serializable building blocks for the batched
//          write engine and repository facade.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types define the entity model, queued mutation records, the partition
//! batch planner, and the paging/query vocabulary. They are backend-agnostic;
//! concrete stores consume them through the crate's interfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod batching;
pub mod entity;
pub mod mutation;
pub mod paging;
pub mod query;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use batching::MAX_GROUP_OPERATIONS;
pub use batching::SubBatch;
pub use batching::plan_batches;
pub use entity::EntityKey;
pub use entity::EntityRecord;
pub use entity::Etag;
pub use entity::PartitionKey;
pub use entity::RowKey;
pub use entity::SerializationError;
pub use entity::TableEntity;
pub use mutation::MutationKind;
pub use mutation::OperationRecord;
pub use paging::ContinuationToken;
pub use paging::PagedResult;
pub use paging::TokenError;
pub use query::QueryFilter;
pub use query::TableQuery;
