// crates/tablebatch-core/src/core/entity.rs
// ============================================================================
// Module: Tablebatch Entity Model
// Description: Keys, version tags, and store-native entity records.
// Purpose: Provide strongly typed identity and serialization boundaries for
//          table entities.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Entities are opaque user records addressed by a two-part key: partition
//! key plus row key. This module defines the key newtypes, the opaque `ETag`
//! version tag, the [`TableEntity`] contract implemented by user types, and
//! [`EntityRecord`], the store-native representation entities are converted
//! to at the submission boundary.
//!
//! The version tag is never interpreted by this layer; it is captured from
//! the caller and forwarded to the store for optimistic concurrency checks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Key Types
// ============================================================================

/// Partition key of a table entity.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
/// - Equality is value equality; atomic operation groups are scoped to one
///   partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a new partition key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Row key of a table entity, unique within one partition.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization or validation is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    /// Creates a new row key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Full two-part identity of a table entity.
///
/// # Invariants
/// - Ordering sorts by partition key first, then row key, which matches the
///   store's native enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Partition component of the identity.
    pub partition_key: PartitionKey,
    /// Row component of the identity.
    pub row_key: RowKey,
}

impl EntityKey {
    /// Creates a new entity key from its two components.
    #[must_use]
    pub fn new(partition_key: impl Into<PartitionKey>, row_key: impl Into<RowKey>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition_key, self.row_key)
    }
}

// ============================================================================
// SECTION: Version Tags
// ============================================================================

/// Wildcard version tag matching any stored version.
const WILDCARD_ETAG: &str = "*";

/// Opaque entity version tag used by the store for optimistic concurrency.
///
/// # Invariants
/// - Never interpreted by this layer; only captured and forwarded.
/// - The wildcard tag (`"*"`) requests an unconditional write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Etag(String);

impl Etag {
    /// Creates a new version tag from an opaque store-provided value.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the wildcard tag that matches any stored version.
    #[must_use]
    pub fn wildcard() -> Self {
        Self(WILDCARD_ETAG.to_string())
    }

    /// Returns `true` when this tag is the wildcard tag.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_ETAG
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Entity Contract
// ============================================================================

/// Contract implemented by user entity types stored in a table.
///
/// Implementations expose the two-part identity and, optionally, a version
/// tag previously observed from the store. A missing tag requests an
/// unconditional write for mutations that would otherwise check versions.
pub trait TableEntity {
    /// Returns the partition key of the entity.
    fn partition_key(&self) -> PartitionKey;

    /// Returns the row key of the entity.
    fn row_key(&self) -> RowKey;

    /// Returns the version tag last observed for the entity, if any.
    fn etag(&self) -> Option<Etag> {
        None
    }

    /// Returns the full two-part key of the entity.
    fn key(&self) -> EntityKey {
        EntityKey {
            partition_key: self.partition_key(),
            row_key: self.row_key(),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors converting between user entities and store-native records.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone)]
pub enum SerializationError {
    /// Entity did not serialize to a JSON object.
    #[error("entity must serialize to an object, got {0}")]
    NotAnObject(String),
    /// Underlying JSON conversion failed.
    #[error("entity serialization failed: {0}")]
    Json(String),
}

// ============================================================================
// SECTION: Store-Native Records
// ============================================================================

/// Store-native representation of one entity.
///
/// # Invariants
/// - `properties` holds the entity's serialized fields as an opaque map; this
///   layer never inspects individual properties.
/// - `etag` is `None` for entities never observed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Two-part identity of the entity.
    pub key: EntityKey,
    /// Version tag observed from the store, if any.
    pub etag: Option<Etag>,
    /// Serialized entity fields.
    pub properties: Map<String, Value>,
}

impl EntityRecord {
    /// Converts a user entity into its store-native record.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] when the entity does not serialize to a
    /// JSON object.
    pub fn from_entity<E>(entity: &E) -> Result<Self, SerializationError>
    where
        E: TableEntity + Serialize,
    {
        let value = serde_json::to_value(entity).map_err(|e| SerializationError::Json(e.to_string()))?;
        let Value::Object(properties) = value else {
            return Err(SerializationError::NotAnObject(json_kind(&value).to_string()));
        };
        Ok(Self {
            key: entity.key(),
            etag: entity.etag(),
            properties,
        })
    }

    /// Converts the record back into a typed user entity.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] when the stored properties do not
    /// deserialize into `E`.
    pub fn into_entity<E>(self) -> Result<E, SerializationError>
    where
        E: DeserializeOwned,
    {
        serde_json::from_value(Value::Object(self.properties))
            .map_err(|e| SerializationError::Json(e.to_string()))
    }

    /// Returns a copy of the record carrying the wildcard version tag.
    #[must_use]
    pub fn with_wildcard_etag(&self) -> Self {
        Self {
            key: self.key.clone(),
            etag: Some(Etag::wildcard()),
            properties: self.properties.clone(),
        }
    }
}

/// Returns a short label describing a JSON value's kind.
const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
