// crates/tablebatch-core/src/runtime/mod.rs
// ============================================================================
// Module: Tablebatch Runtime
// Description: Batched write execution, writers, and the repository facade.
// Purpose: Drive queued operations through the store boundary with retry,
//          ordering, and consistency guarantees.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime components execute what the core types describe: the executor
//! submits planned sub-batches with retry resilience, the writers own the
//! producer queues and failure semantics, and the repository wraps single
//! operations and segmented queries for typed entities.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod compensating;
pub mod executor;
pub mod repository;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use compensating::CompensatingBatchWriter;
pub use executor::BatchExecutor;
pub use executor::RetryPolicy;
pub use repository::DEFAULT_PAGE_SIZE;
pub use repository::RepositoryError;
pub use repository::TableRepository;
pub use writer::BatchError;
pub use writer::BatchReport;
pub use writer::BatchWriter;
