// crates/tablebatch-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared entities and a scripted store for tablebatch-core tests.
// Purpose: Provide reusable test entities and a recording TableStore double.
// Dependencies: tablebatch-core, serde
// ============================================================================

//! ## Overview
//! Provides the test entity types and [`ScriptedStore`], a [`TableStore`]
//! double that records every submission and fails on a configurable schedule
//! so writer and executor behavior can be asserted deterministically.

#![allow(
    dead_code,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only helpers are shared across test binaries and permitted."
)]

use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use tablebatch_core::ContinuationToken;
use tablebatch_core::EntityKey;
use tablebatch_core::EntityRecord;
use tablebatch_core::Etag;
use tablebatch_core::MutationKind;
use tablebatch_core::PartitionKey;
use tablebatch_core::RowKey;
use tablebatch_core::StoreError;
use tablebatch_core::StoreOperation;
use tablebatch_core::StoreSegment;
use tablebatch_core::TableEntity;
use tablebatch_core::TableQuery;
use tablebatch_core::TableStore;

// ============================================================================
// SECTION: Test Entities
// ============================================================================

/// Simple test entity with an explicit two-part key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Partition component of the identity.
    pub partition: String,
    /// Row component of the identity.
    pub row: String,
    /// Arbitrary payload field.
    pub amount: i64,
}

impl Ticket {
    /// Creates a test ticket.
    pub fn new(partition: &str, row: &str, amount: i64) -> Self {
        Self {
            partition: partition.to_string(),
            row: row.to_string(),
            amount,
        }
    }
}

impl TableEntity for Ticket {
    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.partition.clone())
    }

    fn row_key(&self) -> RowKey {
        RowKey::new(self.row.clone())
    }
}

/// Entity that serializes to a bare string instead of an object.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct BareString(pub String);

impl TableEntity for BareString {
    fn partition_key(&self) -> PartitionKey {
        PartitionKey::new("p")
    }

    fn row_key(&self) -> RowKey {
        RowKey::new(self.0.clone())
    }
}

// ============================================================================
// SECTION: Scripted Store
// ============================================================================

/// One recorded group submission: partition key plus row keys in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedGroup {
    /// Partition key shared by the group.
    pub partition_key: String,
    /// Row keys in submission order.
    pub row_keys: Vec<String>,
}

/// Mutable script and recordings behind the store's mutex.
#[derive(Debug, Default)]
struct ScriptState {
    /// Groups accepted so far.
    committed: Vec<RecordedGroup>,
    /// Keys deleted through `apply_one` so far.
    deletes: Vec<EntityKey>,
    /// Remaining transient failures to raise before accepting groups.
    transient_failures: u64,
    /// 1-based group submission number to reject fatally, if set.
    reject_submission: Option<u64>,
    /// Total group submissions attempted.
    submissions: u64,
    /// When `true`, deletes through `apply_one` fail with an I/O error.
    fail_deletes: bool,
    /// When `true`, deletes through `apply_one` report the key as absent.
    deletes_not_found: bool,
}

/// Recording [`TableStore`] double with a configurable failure schedule.
#[derive(Debug, Default)]
pub struct ScriptedStore {
    /// Script and recordings.
    state: Mutex<ScriptState>,
}

impl ScriptedStore {
    /// Creates a store that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises transient failures for the next `count` group submissions.
    pub fn fail_transiently(&self, count: u64) {
        self.state_guard().transient_failures = count;
    }

    /// Fatally rejects the group submission with the given 1-based number.
    pub fn reject_submission(&self, submission: u64) {
        self.state_guard().reject_submission = Some(submission);
    }

    /// Makes every delete through `apply_one` fail with an I/O error.
    pub fn fail_deletes(&self) {
        self.state_guard().fail_deletes = true;
    }

    /// Makes every delete through `apply_one` report the key as absent.
    pub fn deletes_not_found(&self) {
        self.state_guard().deletes_not_found = true;
    }

    /// Returns the groups committed so far, in submission order.
    pub fn committed_groups(&self) -> Vec<RecordedGroup> {
        self.state_guard().committed.clone()
    }

    /// Returns the keys deleted through `apply_one`, in call order.
    pub fn deleted_keys(&self) -> Vec<EntityKey> {
        self.state_guard().deletes.clone()
    }

    /// Returns the total number of group submissions attempted.
    pub fn submissions(&self) -> u64 {
        self.state_guard().submissions
    }

    /// Locks the script state.
    fn state_guard(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TableStore for ScriptedStore {
    fn submit_atomic_group(
        &self,
        _table: &str,
        operations: &[StoreOperation],
    ) -> Result<Vec<Etag>, StoreError> {
        let mut state = self.state_guard();
        state.submissions += 1;
        if state.reject_submission == Some(state.submissions) {
            return Err(StoreError::GroupRejected {
                index: 0,
                message: "scripted rejection".to_string(),
            });
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(StoreError::Transient("scripted throttle".to_string()));
        }
        let partition_key = operations
            .first()
            .map_or_else(String::new, |op| op.entity.key.partition_key.to_string());
        state.committed.push(RecordedGroup {
            partition_key,
            row_keys: operations
                .iter()
                .map(|op| op.entity.key.row_key.to_string())
                .collect(),
        });
        Ok(operations
            .iter()
            .enumerate()
            .map(|(i, _)| Etag::new(format!("v{i}")))
            .collect())
    }

    fn apply_one(&self, _table: &str, operation: &StoreOperation) -> Result<Option<Etag>, StoreError> {
        let mut state = self.state_guard();
        if operation.mutation == MutationKind::Delete {
            if state.fail_deletes {
                return Err(StoreError::Io("scripted delete failure".to_string()));
            }
            if state.deletes_not_found {
                return Err(StoreError::NotFound(operation.entity.key.to_string()));
            }
            state.deletes.push(operation.entity.key.clone());
            return Ok(None);
        }
        Ok(Some(Etag::new("v0")))
    }

    fn retrieve(&self, _table: &str, _key: &EntityKey) -> Result<Option<EntityRecord>, StoreError> {
        Ok(None)
    }

    fn query_segment(
        &self,
        _table: &str,
        _query: &TableQuery,
        _continuation: Option<&ContinuationToken>,
        _page_size: usize,
    ) -> Result<StoreSegment, StoreError> {
        Ok(StoreSegment {
            records: Vec::new(),
            continuation: None,
        })
    }

    fn create_table_if_not_exists(&self, _table: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn delete_table(&self, _table: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
