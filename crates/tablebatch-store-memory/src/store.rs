// crates/tablebatch-store-memory/src/store.rs
// ============================================================================
// Module: Memory Table Store
// Description: In-process TableStore with atomic same-partition groups.
// Purpose: Provide a concrete store for embedding and tests, including
//          fault-injection controls for failure-path coverage.
// Dependencies: tablebatch-core, serde, serde_json, serde_jcs, sha2,
//               thiserror
// ============================================================================

//! ## Overview
//! This module implements the [`TableStore`] contract against in-process
//! `BTreeMap` tables. Operation groups are staged against a copy of the
//! target table and committed only if every operation succeeds, so a group
//! either fully applies or leaves the table untouched. Version tags are
//! content hashes over RFC 8785 canonical JSON plus a monotonic write stamp,
//! so every committed write yields a distinct tag.
//!
//! Fault-injection hooks let tests fail specific group submissions
//! (transiently or fatally) and fail single-entity deletes, which is how the
//! retry and compensation paths are exercised without a remote store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use tablebatch_core::ContinuationToken;
use tablebatch_core::EntityKey;
use tablebatch_core::EntityRecord;
use tablebatch_core::Etag;
use tablebatch_core::MutationKind;
use tablebatch_core::StoreError;
use tablebatch_core::StoreOperation;
use tablebatch_core::StoreSegment;
use tablebatch_core::TableQuery;
use tablebatch_core::TableStore;
use tablebatch_core::MAX_GROUP_OPERATIONS;
use thiserror::Error;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the in-process table store.
///
/// # Invariants
/// - `max_group_operations` is between 1 and [`MAX_GROUP_OPERATIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MemoryStoreConfig {
    /// Maximum operations accepted per atomic group.
    #[serde(default = "default_max_group_operations")]
    pub max_group_operations: usize,
    /// When `true`, operations against unknown tables fail instead of
    /// auto-creating the table on write.
    #[serde(default)]
    pub fail_unknown_table: bool,
}

/// Returns the default per-group operation limit.
const fn default_max_group_operations() -> usize {
    MAX_GROUP_OPERATIONS
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_group_operations: default_max_group_operations(),
            fail_unknown_table: false,
        }
    }
}

/// Validates the store configuration.
fn validate_config(config: &MemoryStoreConfig) -> Result<(), MemoryStoreError> {
    if config.max_group_operations == 0 {
        return Err(MemoryStoreError::Invalid(
            "max_group_operations must be greater than zero".to_string(),
        ));
    }
    if config.max_group_operations > MAX_GROUP_OPERATIONS {
        return Err(MemoryStoreError::Invalid(format!(
            "max_group_operations out of range: {} (max {MAX_GROUP_OPERATIONS})",
            config.max_group_operations
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Memory store construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryStoreError {
    /// Invalid store configuration.
    #[error("memory store invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Fault Injection
// ============================================================================

/// Kind of injected group-submission fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultKind {
    /// Retryable fault; reported as [`StoreError::Transient`].
    #[default]
    Transient,
    /// Terminal fault; reported as a group rejection.
    Fatal,
}

/// Scheduled faults applied to upcoming store calls.
#[derive(Debug, Default)]
struct FaultPlan {
    /// Number of upcoming group submissions to fail.
    fail_next_groups: u64,
    /// Kind of fault raised by `fail_next_groups`.
    next_kind: FaultKind,
    /// 1-based global submission number to fail fatally, if set.
    fail_group_at: Option<u64>,
    /// When `true`, single-entity deletes fail with an I/O error.
    fail_deletes: bool,
}

/// Store call counters used by test assertions.
#[derive(Debug, Default)]
struct StoreStats {
    /// Number of group submissions attempted (including failed ones).
    group_submissions: u64,
    /// Number of groups committed.
    group_commits: u64,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// One stored table row.
#[derive(Debug, Clone)]
struct StoredRow {
    /// Serialized entity properties.
    properties: Map<String, Value>,
    /// Version tag of the stored row.
    etag: Etag,
}

/// Rows of one table, sorted by entity key.
type TableRows = BTreeMap<EntityKey, StoredRow>;

/// In-process [`TableStore`] with staged all-or-nothing group commits.
///
/// # Invariants
/// - A group submission either applies every operation or leaves the table
///   unchanged.
/// - Committed writes always produce a version tag distinct from every
///   earlier tag.
pub struct MemoryTableStore {
    /// Store configuration.
    config: MemoryStoreConfig,
    /// Tables keyed by name, guarded by one mutex.
    tables: Mutex<HashMap<String, TableRows>>,
    /// Monotonic stamp folded into version tags.
    write_stamp: AtomicU64,
    /// Scheduled fault plan for upcoming calls.
    faults: Mutex<FaultPlan>,
    /// Call counters for test assertions.
    stats: Mutex<StoreStats>,
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self {
            config: MemoryStoreConfig::default(),
            tables: Mutex::new(HashMap::new()),
            write_stamp: AtomicU64::new(0),
            faults: Mutex::new(FaultPlan::default()),
            stats: Mutex::new(StoreStats::default()),
        }
    }
}

impl MemoryTableStore {
    /// Creates a store with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryStoreError`] when the configuration is out of range.
    pub fn new(config: MemoryStoreConfig) -> Result<Self, MemoryStoreError> {
        validate_config(&config)?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    // ------------------------------------------------------------------
    // Fault injection and counters
    // ------------------------------------------------------------------

    /// Fails the next `count` group submissions with the given fault kind.
    pub fn fail_next_groups(&self, count: u64, kind: FaultKind) {
        let mut faults = self.faults_guard();
        faults.fail_next_groups = count;
        faults.next_kind = kind;
    }

    /// Fatally fails the group submission with the given 1-based global
    /// submission number.
    pub fn fail_group_at(&self, submission: u64) {
        self.faults_guard().fail_group_at = Some(submission);
    }

    /// Enables or disables injected failures of single-entity deletes.
    pub fn fail_deletes(&self, enabled: bool) {
        self.faults_guard().fail_deletes = enabled;
    }

    /// Returns the number of group submissions attempted so far.
    #[must_use]
    pub fn group_submissions(&self) -> u64 {
        self.stats_guard().group_submissions
    }

    /// Returns the number of groups committed so far.
    #[must_use]
    pub fn group_commits(&self) -> u64 {
        self.stats_guard().group_commits
    }

    /// Returns the number of entities currently stored in the table.
    #[must_use]
    pub fn entity_count(&self, table: &str) -> usize {
        self.tables_guard().get(table).map_or(0, BTreeMap::len)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Locks the table map, recovering from poisoning (rows stay valid even
    /// if another caller panicked).
    fn tables_guard(&self) -> MutexGuard<'_, HashMap<String, TableRows>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the fault plan.
    fn faults_guard(&self) -> MutexGuard<'_, FaultPlan> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the call counters.
    fn stats_guard(&self) -> MutexGuard<'_, StoreStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the next monotonic write stamp.
    fn next_stamp(&self) -> u64 {
        self.write_stamp.fetch_add(1, Ordering::SeqCst)
    }

    /// Counts a group submission and raises any scheduled fault for it.
    fn note_group_submission(&self) -> Result<(), StoreError> {
        let submission = {
            let mut stats = self.stats_guard();
            stats.group_submissions += 1;
            stats.group_submissions
        };
        let mut faults = self.faults_guard();
        if faults.fail_group_at == Some(submission) {
            faults.fail_group_at = None;
            return Err(StoreError::GroupRejected {
                index: 0,
                message: "injected fault".to_string(),
            });
        }
        if faults.fail_next_groups > 0 {
            faults.fail_next_groups -= 1;
            return Err(match faults.next_kind {
                FaultKind::Transient => StoreError::Transient("injected transient fault".to_string()),
                FaultKind::Fatal => StoreError::GroupRejected {
                    index: 0,
                    message: "injected fault".to_string(),
                },
            });
        }
        Ok(())
    }

    /// Applies one operation to a row map, returning the row's version tag
    /// after the operation (the last stored tag for deletes).
    fn apply_operation(
        rows: &mut TableRows,
        operation: &StoreOperation,
        stamp: u64,
    ) -> Result<Etag, StoreError> {
        let key = operation.entity.key.clone();
        match operation.mutation {
            MutationKind::Insert => {
                if rows.contains_key(&key) {
                    return Err(StoreError::Conflict(key.to_string()));
                }
                let etag = compute_etag(&operation.entity.properties, stamp);
                rows.insert(
                    key,
                    StoredRow {
                        properties: operation.entity.properties.clone(),
                        etag: etag.clone(),
                    },
                );
                Ok(etag)
            }
            MutationKind::Delete => {
                let Some(row) = rows.get(&key) else {
                    return Err(StoreError::NotFound(key.to_string()));
                };
                check_etag(operation.entity.etag.as_ref(), row)?;
                let last = row.etag.clone();
                rows.remove(&key);
                Ok(last)
            }
            MutationKind::Merge => {
                let Some(row) = rows.get_mut(&key) else {
                    return Err(StoreError::NotFound(key.to_string()));
                };
                check_etag(operation.entity.etag.as_ref(), row)?;
                merge_properties(&mut row.properties, &operation.entity.properties);
                row.etag = compute_etag(&row.properties, stamp);
                Ok(row.etag.clone())
            }
            MutationKind::Replace => {
                let Some(row) = rows.get_mut(&key) else {
                    return Err(StoreError::NotFound(key.to_string()));
                };
                check_etag(operation.entity.etag.as_ref(), row)?;
                row.properties = operation.entity.properties.clone();
                row.etag = compute_etag(&row.properties, stamp);
                Ok(row.etag.clone())
            }
            MutationKind::InsertOrMerge => {
                let etag = match rows.get_mut(&key) {
                    Some(row) => {
                        merge_properties(&mut row.properties, &operation.entity.properties);
                        row.etag = compute_etag(&row.properties, stamp);
                        row.etag.clone()
                    }
                    None => {
                        let etag = compute_etag(&operation.entity.properties, stamp);
                        rows.insert(
                            key,
                            StoredRow {
                                properties: operation.entity.properties.clone(),
                                etag: etag.clone(),
                            },
                        );
                        etag
                    }
                };
                Ok(etag)
            }
            MutationKind::InsertOrReplace => {
                let etag = compute_etag(&operation.entity.properties, stamp);
                rows.insert(
                    key,
                    StoredRow {
                        properties: operation.entity.properties.clone(),
                        etag: etag.clone(),
                    },
                );
                Ok(etag)
            }
        }
    }
}

// ============================================================================
// SECTION: TableStore Implementation
// ============================================================================

impl TableStore for MemoryTableStore {
    fn submit_atomic_group(
        &self,
        table: &str,
        operations: &[StoreOperation],
    ) -> Result<Vec<Etag>, StoreError> {
        self.note_group_submission()?;
        validate_group(operations, self.config.max_group_operations)?;

        let mut tables = self.tables_guard();
        if self.config.fail_unknown_table && !tables.contains_key(table) {
            return Err(StoreError::NotFound(format!("table {table}")));
        }
        let rows = tables.entry(table.to_string()).or_default();

        // Stage against a copy so a mid-group failure leaves the table
        // untouched.
        let mut staged = rows.clone();
        let mut etags = Vec::with_capacity(operations.len());
        for (index, operation) in operations.iter().enumerate() {
            let stamp = self.next_stamp();
            match Self::apply_operation(&mut staged, operation, stamp) {
                Ok(etag) => etags.push(etag),
                Err(error) => {
                    return Err(StoreError::GroupRejected {
                        index,
                        message: error.to_string(),
                    });
                }
            }
        }
        *rows = staged;
        self.stats_guard().group_commits += 1;
        Ok(etags)
    }

    fn apply_one(&self, table: &str, operation: &StoreOperation) -> Result<Option<Etag>, StoreError> {
        if operation.mutation == MutationKind::Delete && self.faults_guard().fail_deletes {
            return Err(StoreError::Io("injected delete failure".to_string()));
        }

        let mut tables = self.tables_guard();
        if self.config.fail_unknown_table && !tables.contains_key(table) {
            return Err(StoreError::NotFound(format!("table {table}")));
        }
        let rows = tables.entry(table.to_string()).or_default();
        let stamp = self.next_stamp();
        let etag = Self::apply_operation(rows, operation, stamp)?;
        if operation.mutation == MutationKind::Delete {
            Ok(None)
        } else {
            Ok(Some(etag))
        }
    }

    fn retrieve(&self, table: &str, key: &EntityKey) -> Result<Option<EntityRecord>, StoreError> {
        let tables = self.tables_guard();
        let Some(rows) = tables.get(table) else {
            if self.config.fail_unknown_table {
                return Err(StoreError::NotFound(format!("table {table}")));
            }
            return Ok(None);
        };
        Ok(rows.get(key).map(|row| EntityRecord {
            key: key.clone(),
            etag: Some(row.etag.clone()),
            properties: row.properties.clone(),
        }))
    }

    fn query_segment(
        &self,
        table: &str,
        query: &TableQuery,
        continuation: Option<&ContinuationToken>,
        page_size: usize,
    ) -> Result<StoreSegment, StoreError> {
        if page_size == 0 {
            return Err(StoreError::Invalid("page_size must be greater than zero".to_string()));
        }
        if query.take == Some(0) {
            return Err(StoreError::Invalid("take must be greater than zero".to_string()));
        }
        let effective = query.take.map_or(page_size, |take| take.min(page_size));

        let tables = self.tables_guard();
        let Some(rows) = tables.get(table) else {
            if self.config.fail_unknown_table {
                return Err(StoreError::NotFound(format!("table {table}")));
            }
            return Ok(StoreSegment {
                records: Vec::new(),
                continuation: None,
            });
        };

        let lower = continuation.map_or(Bound::Unbounded, |token| Bound::Included(token.next_key()));
        let mut records = Vec::new();
        let mut next = None;
        for (key, row) in rows.range((lower, Bound::Unbounded)) {
            if !query.filter.matches(key) {
                continue;
            }
            if records.len() == effective {
                next = Some(ContinuationToken::new(
                    key.partition_key.clone(),
                    key.row_key.clone(),
                ));
                break;
            }
            records.push(EntityRecord {
                key: key.clone(),
                etag: Some(row.etag.clone()),
                properties: row.properties.clone(),
            });
        }
        Ok(StoreSegment {
            records,
            continuation: next,
        })
    }

    fn create_table_if_not_exists(&self, table: &str) -> Result<(), StoreError> {
        self.tables_guard().entry(table.to_string()).or_default();
        Ok(())
    }

    fn delete_table(&self, table: &str) -> Result<(), StoreError> {
        self.tables_guard().remove(table);
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates the group submission contract.
fn validate_group(operations: &[StoreOperation], max_operations: usize) -> Result<(), StoreError> {
    if operations.is_empty() {
        return Err(StoreError::InvalidGroup("group is empty".to_string()));
    }
    if operations.len() > max_operations {
        return Err(StoreError::InvalidGroup(format!(
            "group has {} operations (max {max_operations})",
            operations.len()
        )));
    }
    let partition_key = &operations[0].entity.key.partition_key;
    if operations
        .iter()
        .any(|operation| operation.entity.key.partition_key != *partition_key)
    {
        return Err(StoreError::InvalidGroup(
            "group spans multiple partition keys".to_string(),
        ));
    }
    Ok(())
}

/// Checks an optional expected version tag against the stored row.
fn check_etag(expected: Option<&Etag>, row: &StoredRow) -> Result<(), StoreError> {
    if let Some(tag) = expected
        && !tag.is_wildcard()
        && *tag != row.etag
    {
        return Err(StoreError::PreconditionFailed(format!(
            "etag mismatch: expected {tag}, stored {}",
            row.etag
        )));
    }
    Ok(())
}

/// Merges incoming properties over the stored ones, property by property.
fn merge_properties(stored: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (name, value) in incoming {
        stored.insert(name.clone(), value.clone());
    }
}

/// Computes a version tag from canonical property JSON plus a write stamp.
fn compute_etag(properties: &Map<String, Value>, stamp: u64) -> Etag {
    let canonical =
        serde_jcs::to_vec(&Value::Object(properties.clone())).unwrap_or_else(|_| Vec::new());
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hasher.update(stamp.to_be_bytes());
    Etag::new(hex_encode(&hasher.finalize()))
}

/// Encodes bytes as lowercase hex.
fn hex_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded
}
