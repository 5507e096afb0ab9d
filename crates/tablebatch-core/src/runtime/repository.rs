// crates/tablebatch-core/src/runtime/repository.rs
// ============================================================================
// Module: Tablebatch Repository
// Description: Typed CRUD and paged-query facade over one table.
// Purpose: Give application code entity-level access while hiding
//          continuation-token handling and retry plumbing.
// Dependencies: serde, thiserror, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The repository binds one entity type to one `(store, table)` pair. Single
//! writes go straight to the store under the retry policy; listings run as
//! segmented queries whose continuation cursors surface as opaque strings.
//! Batched work is delegated to writers created by [`TableRepository::batch_writer`]
//! and [`TableRepository::compensating_batch_writer`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::entity::EntityKey;
use crate::core::entity::EntityRecord;
use crate::core::entity::SerializationError;
use crate::core::entity::TableEntity;
use crate::core::mutation::MutationKind;
use crate::core::paging::ContinuationToken;
use crate::core::paging::PagedResult;
use crate::core::paging::TokenError;
use crate::core::query::TableQuery;
use crate::interfaces::PreconditionError;
use crate::interfaces::StoreError;
use crate::interfaces::StoreOperation;
use crate::interfaces::TableStore;
use crate::runtime::compensating::CompensatingBatchWriter;
use crate::runtime::executor::BatchExecutor;
use crate::runtime::executor::RetryPolicy;
use crate::runtime::writer::BatchWriter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default page size for listings when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by repository operations.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// Caller violated an argument precondition.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    /// Entity conversion to or from the store-native form failed.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    /// Continuation token was malformed.
    #[error(transparent)]
    Token(#[from] TokenError),
    /// Store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A required result was not found.
    #[error("no entity matched the query")]
    NoResult,
}

// ============================================================================
// SECTION: Repository
// ============================================================================

/// Typed data-access facade over one table in one store.
///
/// # Invariants
/// - Every store call runs under the repository's retry policy.
/// - Writers created by this repository share its store, table, and policy.
pub struct TableRepository<E> {
    /// Retrying store gateway bound to the target table.
    executor: BatchExecutor,
    /// Entity type marker.
    _entity: PhantomData<fn() -> E>,
}

impl<E> fmt::Debug for TableRepository<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRepository")
            .field("table", &self.executor.table())
            .finish_non_exhaustive()
    }
}

impl<E> TableRepository<E>
where
    E: TableEntity + Serialize + DeserializeOwned,
{
    /// Creates a repository over one table with the default retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            executor: BatchExecutor::with_policy_unchecked(store, table, RetryPolicy::default()),
            _entity: PhantomData,
        }
    }

    /// Creates a repository with an explicit retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`PreconditionError`] when the policy is out of range.
    pub fn with_retry_policy(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self, PreconditionError> {
        Ok(Self {
            executor: BatchExecutor::new(store, table, policy)?,
            _entity: PhantomData,
        })
    }

    /// Returns the table this repository operates on.
    #[must_use]
    pub fn table(&self) -> &str {
        self.executor.table()
    }

    // ------------------------------------------------------------------
    // Single-entity writes
    // ------------------------------------------------------------------

    /// Inserts the entity; fails if the key already exists.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the write.
    pub fn add(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::Insert, entity)
    }

    /// Replaces the entity's stored version; fails if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the write.
    pub fn update(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::Replace, entity)
    }

    /// Merges the entity's properties into its stored version; fails if the
    /// key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the write.
    pub fn merge(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::Merge, entity)
    }

    /// Inserts the entity, or replaces the stored version if the key exists.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the write.
    pub fn insert_or_replace(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::InsertOrReplace, entity)
    }

    /// Inserts the entity, or merges into the stored version if the key
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the write.
    pub fn insert_or_merge(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::InsertOrMerge, entity)
    }

    /// Deletes the entity; fails if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the entity is not storable or the
    /// store refuses the delete.
    pub fn delete(&self, entity: &E) -> Result<(), RepositoryError> {
        self.apply(MutationKind::Delete, entity)
    }

    /// Converts the entity and applies one mutation under the retry policy.
    fn apply(&self, mutation: MutationKind, entity: &E) -> Result<(), RepositoryError> {
        let record = EntityRecord::from_entity(entity)?;
        let operation = StoreOperation {
            mutation,
            entity: record,
        };
        self.executor.apply_one(&operation)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns the entity addressed by partition key and row key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when either key is blank,
    /// and [`RepositoryError`] when retrieval or deserialization fails.
    pub fn get(&self, partition_key: &str, row_key: &str) -> Result<Option<E>, RepositoryError> {
        require_non_blank(partition_key, "partition_key")?;
        require_non_blank(row_key, "row_key")?;
        let key = EntityKey::new(partition_key, row_key);
        let record = self
            .executor
            .run_with_retries(|| self.executor.store().retrieve(self.executor.table(), &key))?;
        record.map(EntityRecord::into_entity).transpose().map_err(Into::into)
    }

    /// Executes the query and returns one page with the default page size.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the token is malformed or the store
    /// fails.
    pub fn query(
        &self,
        query: &TableQuery,
        continuation: Option<&str>,
    ) -> Result<PagedResult<E>, RepositoryError> {
        self.query_with_page_size(query, DEFAULT_PAGE_SIZE, continuation)
    }

    /// Executes the query and returns one page of at most `page_size`
    /// entities.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when `page_size` or the
    /// query's `take` is zero, and [`RepositoryError`] when the token is
    /// malformed or the store fails.
    pub fn query_with_page_size(
        &self,
        query: &TableQuery,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<PagedResult<E>, RepositoryError> {
        if page_size == 0 {
            return Err(PreconditionError::new("page_size must be greater than zero").into());
        }
        if query.take == Some(0) {
            return Err(PreconditionError::new("take must be greater than zero").into());
        }
        let cursor = decode_continuation(continuation)?;
        let segment = self.executor.run_with_retries(|| {
            self.executor
                .store()
                .query_segment(self.executor.table(), query, cursor.as_ref(), page_size)
        })?;

        let mut results = Vec::with_capacity(segment.records.len());
        for record in segment.records {
            results.push(record.into_entity()?);
        }
        let continuation_token = match segment.continuation {
            Some(token) => Some(token.encode()?),
            None => None,
        };
        Ok(PagedResult::new(results, continuation_token))
    }

    /// Returns one page of every entity in the table.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the token is malformed or the store
    /// fails.
    pub fn list_all(&self, continuation: Option<&str>) -> Result<PagedResult<E>, RepositoryError> {
        self.query(&TableQuery::all(), continuation)
    }

    /// Returns one page of every entity, capped at `page_size` results.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when `page_size` is zero,
    /// and [`RepositoryError`] when the token is malformed or the store
    /// fails.
    pub fn list_all_with_page_size(
        &self,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<PagedResult<E>, RepositoryError> {
        self.query_with_page_size(&TableQuery::all(), page_size, continuation)
    }

    /// Returns one page of the entities in one partition.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when the partition key is
    /// blank, and [`RepositoryError`] when the token is malformed or the
    /// store fails.
    pub fn list_by_partition_key(
        &self,
        partition_key: &str,
        continuation: Option<&str>,
    ) -> Result<PagedResult<E>, RepositoryError> {
        self.list_by_partition_key_with_page_size(partition_key, DEFAULT_PAGE_SIZE, continuation)
    }

    /// Returns one page of the entities in one partition, capped at
    /// `page_size` results.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when the partition key is
    /// blank or `page_size` is zero, and [`RepositoryError`] when the token
    /// is malformed or the store fails.
    pub fn list_by_partition_key_with_page_size(
        &self,
        partition_key: &str,
        page_size: usize,
        continuation: Option<&str>,
    ) -> Result<PagedResult<E>, RepositoryError> {
        require_non_blank(partition_key, "partition_key")?;
        self.query_with_page_size(
            &TableQuery::by_partition_key(partition_key),
            page_size,
            continuation,
        )
    }

    /// Returns the first entity matching the query, or `None` when nothing
    /// matches. Empty segments are skipped by following continuation tokens.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the store fails.
    pub fn first_or_default(&self, query: &TableQuery) -> Result<Option<E>, RepositoryError> {
        let mut continuation: Option<String> = None;
        loop {
            let page = self.query_with_page_size(query, 1, continuation.as_deref())?;
            let has_more = page.has_more();
            if let Some(first) = page.results.into_iter().next() {
                return Ok(Some(first));
            }
            if !has_more {
                return Ok(None);
            }
            continuation = page.continuation_token;
        }
    }

    /// Returns the first entity matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NoResult`] when nothing matches, and
    /// [`RepositoryError`] when the store fails.
    pub fn first(&self, query: &TableQuery) -> Result<E, RepositoryError> {
        self.first_or_default(query)?.ok_or(RepositoryError::NoResult)
    }

    /// Returns every entity in one partition, following continuation tokens
    /// to completion. Unbounded in memory; use with care.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Precondition`] when the partition key is
    /// blank, and [`RepositoryError`] when the store fails.
    pub fn get_all_by_partition_key(&self, partition_key: &str) -> Result<Vec<E>, RepositoryError> {
        require_non_blank(partition_key, "partition_key")?;
        self.collect_all(&TableQuery::by_partition_key(partition_key))
    }

    /// Returns every entity in the table, following continuation tokens to
    /// completion. Unbounded in memory; use with care.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when the store fails.
    pub fn get_all(&self) -> Result<Vec<E>, RepositoryError> {
        self.collect_all(&TableQuery::all())
    }

    /// Follows continuation tokens until the query is exhausted.
    fn collect_all(&self, query: &TableQuery) -> Result<Vec<E>, RepositoryError> {
        let mut entities = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self.query_with_page_size(query, DEFAULT_PAGE_SIZE, continuation.as_deref())?;
            continuation = page.continuation_token.clone();
            entities.extend(page.results);
            if continuation.is_none() {
                return Ok(entities);
            }
        }
    }

    // ------------------------------------------------------------------
    // Table administration
    // ------------------------------------------------------------------

    /// Creates the table when it does not already exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when creation fails.
    pub fn create_table_if_not_exists(&self) -> Result<(), RepositoryError> {
        self.executor
            .run_with_retries(|| {
                self.executor
                    .store()
                    .create_table_if_not_exists(self.executor.table())
            })
            .map_err(Into::into)
    }

    /// Deletes the table when it exists.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] when deletion fails.
    pub fn delete_table(&self) -> Result<(), RepositoryError> {
        self.executor
            .run_with_retries(|| self.executor.store().delete_table(self.executor.table()))
            .map_err(Into::into)
    }

    // ------------------------------------------------------------------
    // Writer factories
    // ------------------------------------------------------------------

    /// Creates a fail-fast batch writer sharing this repository's store,
    /// table, and retry policy.
    #[must_use]
    pub fn batch_writer(&self) -> BatchWriter {
        BatchWriter::with_policy_unchecked(
            Arc::clone(self.executor.store()),
            self.executor.table(),
            self.executor.policy(),
        )
    }

    /// Creates a compensating batch writer sharing this repository's store,
    /// table, and retry policy.
    #[must_use]
    pub fn compensating_batch_writer(&self) -> CompensatingBatchWriter {
        CompensatingBatchWriter::with_policy_unchecked(
            Arc::clone(self.executor.store()),
            self.executor.table(),
            self.executor.policy(),
        )
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects blank (empty or whitespace-only) key arguments.
fn require_non_blank(value: &str, name: &str) -> Result<(), PreconditionError> {
    if value.trim().is_empty() {
        return Err(PreconditionError::new(format!("{name} is null or empty")));
    }
    Ok(())
}

/// Decodes an optional caller-supplied continuation string; blank strings
/// mean "start from the beginning", matching the string-token contract.
fn decode_continuation(continuation: Option<&str>) -> Result<Option<ContinuationToken>, TokenError> {
    match continuation {
        Some(token) if !token.trim().is_empty() => ContinuationToken::decode(token).map(Some),
        _ => Ok(None),
    }
}
