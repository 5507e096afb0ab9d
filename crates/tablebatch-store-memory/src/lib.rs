// crates/tablebatch-store-memory/src/lib.rs
// ============================================================================
// Module: Tablebatch Memory Store Library
// Description: In-process table store backend for Tablebatch.
// Purpose: Expose the memory-backed TableStore implementation and its
//          configuration and fault-injection surface.
// Dependencies: tablebatch-core, crate::store
// ============================================================================

//! ## Overview
//! This crate provides [`MemoryTableStore`], an in-process implementation of
//! the Tablebatch store boundary. It honors the same-partition atomic-group
//! contract with staged all-or-nothing commits, serves segmented key-ordered
//! queries with continuation cursors, and exposes fault-injection controls so
//! the retry, fail-fast, and compensation paths of the write engine can be
//! exercised deterministically in tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::FaultKind;
pub use store::MemoryStoreConfig;
pub use store::MemoryStoreError;
pub use store::MemoryTableStore;
