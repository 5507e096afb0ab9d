// crates/tablebatch-store-memory/tests/memory_store_unit.rs
// ============================================================================
// Module: Memory Store Unit Tests
// Description: Unit tests for the in-process table store.
// Purpose: Validate group atomicity, mutation semantics, version-tag checks,
//          segmented queries, and fault injection.
// Dependencies: tablebatch-store-memory, tablebatch-core, serde_json
// ============================================================================

//! ## Overview
//! Exercises [`tablebatch_store_memory::MemoryTableStore`] directly through
//! the store contract: all-or-nothing group commits, per-mutation semantics,
//! optimistic concurrency via version tags, key-ordered segmented queries,
//! and the fault-injection surface.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tablebatch_core::ContinuationToken;
use tablebatch_core::EntityKey;
use tablebatch_core::EntityRecord;
use tablebatch_core::Etag;
use tablebatch_core::MutationKind;
use tablebatch_core::StoreError;
use tablebatch_core::StoreOperation;
use tablebatch_core::TableQuery;
use tablebatch_core::TableStore;
use tablebatch_store_memory::FaultKind;
use tablebatch_store_memory::MemoryStoreConfig;
use tablebatch_store_memory::MemoryTableStore;

// ============================================================================
// SECTION: Helper Functions
// ============================================================================

/// Builds an entity record with one `value` property.
fn rec(partition: &str, row: &str, value: i64) -> EntityRecord {
    let mut properties = Map::new();
    properties.insert("value".to_string(), json!(value));
    EntityRecord {
        key: EntityKey::new(partition, row),
        etag: None,
        properties,
    }
}

/// Builds a store operation from a mutation and record.
fn op(mutation: MutationKind, entity: EntityRecord) -> StoreOperation {
    StoreOperation { mutation, entity }
}

/// Reads one property value of a stored entity, panicking when absent.
fn stored_value(store: &MemoryTableStore, key: &EntityKey, property: &str) -> Value {
    let record = store.retrieve("t", key).unwrap().unwrap();
    record.properties.get(property).cloned().unwrap()
}

// ============================================================================
// SECTION: Mutation Semantics
// ============================================================================

#[test]
fn insert_then_retrieve_returns_the_entity_with_a_tag() {
    let store = MemoryTableStore::default();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 7)))
        .unwrap();

    let record = store.retrieve("t", &EntityKey::new("pa", "r0")).unwrap().unwrap();

    assert_eq!(record.properties.get("value"), Some(&json!(7)));
    assert!(record.etag.is_some());
}

#[test]
fn duplicate_insert_conflicts() {
    let store = MemoryTableStore::default();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap();

    let error = store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 2)))
        .unwrap_err();

    assert!(matches!(error, StoreError::Conflict(_)));
    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r0"), "value"), json!(1));
}

#[test]
fn merge_combines_properties_instead_of_replacing_them() {
    let store = MemoryTableStore::default();
    let mut first = Map::new();
    first.insert("a".to_string(), json!(1));
    store
        .apply_one(
            "t",
            &op(
                MutationKind::Insert,
                EntityRecord {
                    key: EntityKey::new("pa", "r0"),
                    etag: None,
                    properties: first,
                },
            ),
        )
        .unwrap();

    let mut second = Map::new();
    second.insert("b".to_string(), json!(2));
    store
        .apply_one(
            "t",
            &op(
                MutationKind::Merge,
                EntityRecord {
                    key: EntityKey::new("pa", "r0"),
                    etag: None,
                    properties: second,
                },
            ),
        )
        .unwrap();

    let record = store.retrieve("t", &EntityKey::new("pa", "r0")).unwrap().unwrap();
    assert_eq!(record.properties.get("a"), Some(&json!(1)));
    assert_eq!(record.properties.get("b"), Some(&json!(2)));
}

#[test]
fn replace_drops_properties_absent_from_the_new_version() {
    let store = MemoryTableStore::default();
    let mut first = Map::new();
    first.insert("a".to_string(), json!(1));
    first.insert("b".to_string(), json!(2));
    store
        .apply_one(
            "t",
            &op(
                MutationKind::Insert,
                EntityRecord {
                    key: EntityKey::new("pa", "r0"),
                    etag: None,
                    properties: first,
                },
            ),
        )
        .unwrap();

    store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 3)))
        .unwrap();

    let record = store.retrieve("t", &EntityKey::new("pa", "r0")).unwrap().unwrap();
    assert_eq!(record.properties.get("value"), Some(&json!(3)));
    assert!(!record.properties.contains_key("a"));
}

#[test]
fn merge_and_replace_require_an_existing_entity() {
    let store = MemoryTableStore::default();

    let merge = store
        .apply_one("t", &op(MutationKind::Merge, rec("pa", "r0", 1)))
        .unwrap_err();
    let replace = store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 1)))
        .unwrap_err();

    assert!(merge.is_not_found());
    assert!(replace.is_not_found());
}

#[test]
fn upsert_mutations_work_with_and_without_an_existing_entity() {
    let store = MemoryTableStore::default();

    store
        .apply_one("t", &op(MutationKind::InsertOrReplace, rec("pa", "r0", 1)))
        .unwrap();
    store
        .apply_one("t", &op(MutationKind::InsertOrReplace, rec("pa", "r0", 2)))
        .unwrap();
    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r0"), "value"), json!(2));

    store
        .apply_one("t", &op(MutationKind::InsertOrMerge, rec("pa", "r1", 1)))
        .unwrap();
    store
        .apply_one("t", &op(MutationKind::InsertOrMerge, rec("pa", "r1", 3)))
        .unwrap();
    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r1"), "value"), json!(3));
}

#[test]
fn delete_removes_the_entity_and_missing_deletes_are_not_found() {
    let store = MemoryTableStore::default();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap();

    let result = store
        .apply_one("t", &op(MutationKind::Delete, rec("pa", "r0", 1)))
        .unwrap();
    assert!(result.is_none());
    assert!(store.retrieve("t", &EntityKey::new("pa", "r0")).unwrap().is_none());

    let error = store
        .apply_one("t", &op(MutationKind::Delete, rec("pa", "r0", 1)))
        .unwrap_err();
    assert!(error.is_not_found());
}

// ============================================================================
// SECTION: Version Tags
// ============================================================================

#[test]
fn every_committed_write_produces_a_fresh_tag() {
    let store = MemoryTableStore::default();
    let first = store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap()
        .unwrap();
    let second = store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 1)))
        .unwrap()
        .unwrap();

    // Same properties, still a distinct tag.
    assert_ne!(first, second);
}

#[test]
fn stale_tag_fails_the_precondition() {
    let store = MemoryTableStore::default();
    let current = store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap()
        .unwrap();
    store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 2)))
        .unwrap();

    let mut stale = rec("pa", "r0", 3);
    stale.etag = Some(current);
    let error = store
        .apply_one("t", &op(MutationKind::Replace, stale))
        .unwrap_err();

    assert!(matches!(error, StoreError::PreconditionFailed(_)));
    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r0"), "value"), json!(2));
}

#[test]
fn matching_tag_passes_the_precondition() {
    let store = MemoryTableStore::default();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap();
    let current = store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 2)))
        .unwrap()
        .unwrap();

    let mut guarded = rec("pa", "r0", 3);
    guarded.etag = Some(current);
    store.apply_one("t", &op(MutationKind::Replace, guarded)).unwrap();

    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r0"), "value"), json!(3));
}

#[test]
fn wildcard_and_absent_tags_write_unconditionally() {
    let store = MemoryTableStore::default();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap();

    let mut wildcard = rec("pa", "r0", 2);
    wildcard.etag = Some(Etag::wildcard());
    store.apply_one("t", &op(MutationKind::Replace, wildcard)).unwrap();

    store
        .apply_one("t", &op(MutationKind::Replace, rec("pa", "r0", 3)))
        .unwrap();
    assert_eq!(stored_value(&store, &EntityKey::new("pa", "r0"), "value"), json!(3));
}

// ============================================================================
// SECTION: Group Atomicity
// ============================================================================

#[test]
fn failing_operation_leaves_the_whole_group_unapplied() {
    let store = MemoryTableStore::default();
    let operations = vec![
        op(MutationKind::Insert, rec("pa", "r0", 1)),
        // Merge of an absent key fails the group.
        op(MutationKind::Merge, rec("pa", "r9", 2)),
        op(MutationKind::Insert, rec("pa", "r1", 3)),
    ];

    let error = store.submit_atomic_group("t", &operations).unwrap_err();

    match error {
        StoreError::GroupRejected { index, .. } => assert_eq!(index, 1),
        other => panic!("expected GroupRejected, got: {other}"),
    }
    assert_eq!(store.entity_count("t"), 0);
    assert_eq!(store.group_submissions(), 1);
    assert_eq!(store.group_commits(), 0);
}

#[test]
fn accepted_group_returns_one_tag_per_operation_in_order() {
    let store = MemoryTableStore::default();
    let operations: Vec<_> = (0..5)
        .map(|i| op(MutationKind::Insert, rec("pa", &format!("r{i}"), i)))
        .collect();

    let etags = store.submit_atomic_group("t", &operations).unwrap();

    assert_eq!(etags.len(), 5);
    assert_eq!(store.entity_count("t"), 5);
    assert_eq!(store.group_commits(), 1);
}

#[test]
fn later_operations_in_a_group_see_earlier_ones() {
    let store = MemoryTableStore::default();
    let operations = vec![
        op(MutationKind::Insert, rec("pa", "r0", 1)),
        op(MutationKind::Merge, rec("pa", "r0", 2)),
        op(MutationKind::Delete, rec("pa", "r0", 2)),
    ];

    store.submit_atomic_group("t", &operations).unwrap();

    assert_eq!(store.entity_count("t"), 0);
}

#[test]
fn empty_oversized_and_mixed_partition_groups_are_invalid() {
    let store = MemoryTableStore::default();

    let empty = store.submit_atomic_group("t", &[]).unwrap_err();
    assert!(matches!(empty, StoreError::InvalidGroup(_)));

    let oversized: Vec<_> = (0..101)
        .map(|i| op(MutationKind::Insert, rec("pa", &format!("r{i}"), i)))
        .collect();
    let error = store.submit_atomic_group("t", &oversized).unwrap_err();
    assert!(matches!(error, StoreError::InvalidGroup(_)));

    let mixed = vec![
        op(MutationKind::Insert, rec("pa", "r0", 1)),
        op(MutationKind::Insert, rec("pb", "r0", 1)),
    ];
    let error = store.submit_atomic_group("t", &mixed).unwrap_err();
    assert!(matches!(error, StoreError::InvalidGroup(_)));
    assert_eq!(store.entity_count("t"), 0);
}

// ============================================================================
// SECTION: Segmented Queries
// ============================================================================

/// Inserts `count` entities in one partition, rows `r00..`.
fn seed(store: &MemoryTableStore, partition: &str, count: i64) {
    for i in 0..count {
        store
            .apply_one(
                "t",
                &op(MutationKind::Insert, rec(partition, &format!("r{i:02}"), i)),
            )
            .unwrap();
    }
}

#[test]
fn pages_chain_through_continuation_cursors_without_overlap() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 5);

    let first = store.query_segment("t", &TableQuery::all(), None, 2).unwrap();
    assert_eq!(first.records.len(), 2);
    let cursor = first.continuation.unwrap();

    let second = store
        .query_segment("t", &TableQuery::all(), Some(&cursor), 2)
        .unwrap();
    assert_eq!(second.records.len(), 2);
    let cursor = second.continuation.unwrap();

    let third = store
        .query_segment("t", &TableQuery::all(), Some(&cursor), 2)
        .unwrap();
    assert_eq!(third.records.len(), 1);
    assert!(third.continuation.is_none());

    let mut rows: Vec<_> = first
        .records
        .iter()
        .chain(second.records.iter())
        .chain(third.records.iter())
        .map(|r| r.key.row_key.to_string())
        .collect();
    let sorted = rows.clone();
    rows.sort();
    assert_eq!(rows, sorted);
    assert_eq!(rows.len(), 5);
}

#[test]
fn partition_filter_skips_other_partitions() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 3);
    seed(&store, "pb", 3);

    let segment = store
        .query_segment("t", &TableQuery::by_partition_key("pb"), None, 10)
        .unwrap();

    assert_eq!(segment.records.len(), 3);
    assert!(
        segment
            .records
            .iter()
            .all(|r| r.key.partition_key.as_str() == "pb")
    );
    assert!(segment.continuation.is_none());
}

#[test]
fn take_caps_the_page_below_the_page_size() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 5);

    let query = TableQuery::all().with_take(2);
    let segment = store.query_segment("t", &query, None, 10).unwrap();

    assert_eq!(segment.records.len(), 2);
    assert!(segment.continuation.is_some());
}

#[test]
fn key_filter_returns_at_most_one_record() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 3);

    let query = TableQuery::by_key(EntityKey::new("pa", "r01"));
    let segment = store.query_segment("t", &query, None, 10).unwrap();

    assert_eq!(segment.records.len(), 1);
    assert_eq!(segment.records[0].key.row_key.as_str(), "r01");
}

#[test]
fn zero_page_size_is_invalid() {
    let store = MemoryTableStore::default();

    let error = store
        .query_segment("t", &TableQuery::all(), None, 0)
        .unwrap_err();

    assert!(matches!(error, StoreError::Invalid(_)));
}

#[test]
fn zero_take_is_invalid_instead_of_clamped() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 2);

    let query = TableQuery::all().with_take(0);
    let error = store.query_segment("t", &query, None, 10).unwrap_err();

    assert!(matches!(error, StoreError::Invalid(_)));
}

#[test]
fn unknown_table_queries_are_empty_by_default() {
    let store = MemoryTableStore::default();

    let segment = store.query_segment("t", &TableQuery::all(), None, 10).unwrap();
    assert!(segment.records.is_empty());
    assert!(store.retrieve("t", &EntityKey::new("pa", "r0")).unwrap().is_none());
}

#[test]
fn resuming_from_a_cursor_starts_at_its_key() {
    let store = MemoryTableStore::default();
    seed(&store, "pa", 5);

    let cursor = ContinuationToken::new("pa".into(), "r03".into());
    let segment = store
        .query_segment("t", &TableQuery::all(), Some(&cursor), 10)
        .unwrap();

    let rows: Vec<_> = segment.records.iter().map(|r| r.key.row_key.to_string()).collect();
    assert_eq!(rows, vec!["r03", "r04"]);
}

// ============================================================================
// SECTION: Configuration and Fault Injection
// ============================================================================

#[test]
fn out_of_range_configs_are_rejected() {
    assert!(
        MemoryTableStore::new(MemoryStoreConfig {
            max_group_operations: 0,
            fail_unknown_table: false,
        })
        .is_err()
    );
    assert!(
        MemoryTableStore::new(MemoryStoreConfig {
            max_group_operations: 101,
            fail_unknown_table: false,
        })
        .is_err()
    );
}

#[test]
fn strict_table_mode_fails_reads_and_writes_on_unknown_tables() {
    let store = MemoryTableStore::new(MemoryStoreConfig {
        max_group_operations: 100,
        fail_unknown_table: true,
    })
    .unwrap();

    let error = store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap_err();
    assert!(error.is_not_found());

    store.create_table_if_not_exists("t").unwrap();
    store
        .apply_one("t", &op(MutationKind::Insert, rec("pa", "r0", 1)))
        .unwrap();

    store.delete_table("t").unwrap();
    assert!(store.retrieve("t", &EntityKey::new("pa", "r0")).is_err());
}

#[test]
fn scheduled_transient_faults_hit_the_next_submissions() {
    let store = MemoryTableStore::default();
    store.fail_next_groups(2, FaultKind::Transient);
    let operations = vec![op(MutationKind::Insert, rec("pa", "r0", 1))];

    let first = store.submit_atomic_group("t", &operations).unwrap_err();
    let second = store.submit_atomic_group("t", &operations).unwrap_err();
    assert!(first.is_transient());
    assert!(second.is_transient());

    store.submit_atomic_group("t", &operations).unwrap();
    assert_eq!(store.group_submissions(), 3);
    assert_eq!(store.group_commits(), 1);
}

#[test]
fn positional_fault_hits_exactly_one_submission() {
    let store = MemoryTableStore::default();
    store.fail_group_at(2);

    let build = |row: &str| vec![op(MutationKind::Insert, rec("pa", row, 1))];
    store.submit_atomic_group("t", &build("r0")).unwrap();
    let error = store.submit_atomic_group("t", &build("r1")).unwrap_err();
    assert!(!error.is_transient());
    store.submit_atomic_group("t", &build("r2")).unwrap();

    assert_eq!(store.entity_count("t"), 2);
}
