// crates/tablebatch-core/src/lib.rs
// ============================================================================
// Module: Tablebatch Core Library
// Description: Public API surface for the Tablebatch core.
// Purpose: Expose core types, store interfaces, and runtime writers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Tablebatch core is a client-side data-access layer over a partitioned,
//! schema-less key-value table store. It hides pagination,
//! continuation-token handling, and batched multi-entity writes split across
//! server-imposed batch boundaries. The store itself is an external
//! collaborator reached through the [`interfaces::TableStore`] trait; this
//! crate supplies the batching engine, the fail-fast and compensating
//! writers, and a typed repository facade.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::PreconditionError;
pub use interfaces::StoreError;
pub use interfaces::StoreOperation;
pub use interfaces::StoreSegment;
pub use interfaces::TableStore;
pub use runtime::BatchError;
pub use runtime::BatchExecutor;
pub use runtime::BatchReport;
pub use runtime::BatchWriter;
pub use runtime::CompensatingBatchWriter;
pub use runtime::DEFAULT_PAGE_SIZE;
pub use runtime::RepositoryError;
pub use runtime::RetryPolicy;
pub use runtime::TableRepository;
