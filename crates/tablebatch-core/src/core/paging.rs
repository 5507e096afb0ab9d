// crates/tablebatch-core/src/core/paging.rs
// ============================================================================
// Module: Tablebatch Paging
// Description: Paged query results and continuation-token wire encoding.
// Purpose: Hide segmented-query resumption behind opaque string tokens.
// Dependencies: serde, serde_jcs, base64, crate::core::entity
// ============================================================================

//! ## Overview
//! Segmented queries return one page of results plus an optional continuation
//! cursor. The cursor is serialized for callers as an opaque string: RFC 8785
//! canonical JSON wrapped in URL-safe base64. Callers pass the string back
//! unchanged to resume enumeration; its contents are not part of the API
//! contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::entity::EntityKey;
use crate::core::entity::PartitionKey;
use crate::core::entity::RowKey;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Continuation-token encoding and decoding errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum TokenError {
    /// Token serialization failed.
    #[error("continuation token encoding failed: {0}")]
    Encoding(String),
    /// Token string was not a valid encoded cursor.
    #[error("continuation token decoding failed: {0}")]
    Decoding(String),
}

// ============================================================================
// SECTION: Continuation Tokens
// ============================================================================

/// Resumption cursor for a segmented query.
///
/// # Invariants
/// - Points at the first key not yet returned; resuming starts at keys
///   greater than or equal to this position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    /// Partition key of the next unreturned entity.
    pub next_partition_key: PartitionKey,
    /// Row key of the next unreturned entity.
    pub next_row_key: RowKey,
}

impl ContinuationToken {
    /// Creates a cursor pointing at the given key.
    #[must_use]
    pub const fn new(next_partition_key: PartitionKey, next_row_key: RowKey) -> Self {
        Self {
            next_partition_key,
            next_row_key,
        }
    }

    /// Returns the cursor position as a full entity key.
    #[must_use]
    pub fn next_key(&self) -> EntityKey {
        EntityKey {
            partition_key: self.next_partition_key.clone(),
            row_key: self.next_row_key.clone(),
        }
    }

    /// Encodes the cursor into its opaque wire form.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when canonical serialization fails.
    pub fn encode(&self) -> Result<String, TokenError> {
        let canonical = serde_jcs::to_string(self).map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(canonical.as_bytes()))
    }

    /// Decodes an opaque wire token back into a cursor.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the string is not a valid encoded cursor.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|e| TokenError::Decoding(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Decoding(e.to_string()))
    }
}

// ============================================================================
// SECTION: Paged Results
// ============================================================================

/// One page of typed query results plus an optional continuation token.
///
/// # Invariants
/// - `continuation_token` is `Some` exactly when more results are available;
///   the token must be passed back unchanged to fetch the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResult<T> {
    /// Entities in this page.
    pub results: Vec<T>,
    /// Opaque cursor for the next page, if more results exist.
    pub continuation_token: Option<String>,
}

impl<T> PagedResult<T> {
    /// Creates a new page from results and an optional cursor.
    #[must_use]
    pub const fn new(results: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            results,
            continuation_token,
        }
    }

    /// Returns `true` when more results are available past this page.
    #[must_use]
    pub const fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            continuation_token: None,
        }
    }
}
