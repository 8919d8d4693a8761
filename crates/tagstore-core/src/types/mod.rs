//! # Core Type Definitions
//!
//! This module contains the core types for the tagstore index:
//! - Content identifiers (`Id`)
//! - The polymorphic object/tag argument (`Item`)
//! - Error types (`TagstoreError`)
//!
//! ## Determinism Guarantees
//!
//! Identifiers are derived by a pure content hash, are ordered
//! byte-lexicographically, and order identically in memory and on disk, so
//! query results are stable across runs and across processes.

use crate::primitives::ID_LEN;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// A 16-byte content identifier for objects and tags.
///
/// An `Id` is the xxh3-128 hash of a blob, rendered big-endian. The same
/// blob always maps to the same `Id`; distinct blobs map to distinct `Id`s
/// with overwhelming probability (collisions are not handled).
///
/// Ordering is byte-lexicographic, which matches the key order of every
/// table in the schema.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    /// The smallest possible identifier (all zero bytes).
    pub const MIN: Id = Id([0u8; ID_LEN]);

    /// The largest possible identifier (all 0xff bytes).
    pub const MAX: Id = Id([0xffu8; ID_LEN]);

    /// Compute the identifier of a blob.
    ///
    /// Deterministic across runs and platforms: xxh3-128 with the digest
    /// rendered as big-endian bytes.
    #[must_use]
    pub fn digest(blob: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_128(blob).to_be_bytes())
    }

    /// Reconstruct an identifier from raw bytes.
    ///
    /// Returns [`TagstoreError::InvalidInput`] if the slice is not exactly
    /// 16 bytes wide.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TagstoreError> {
        let value: [u8; ID_LEN] = bytes.try_into().map_err(|_| {
            TagstoreError::InvalidInput(format!(
                "identifier must be {ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(value))
    }

    /// The raw identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({self})")
    }
}

// =============================================================================
// POLYMORPHIC OBJECT / TAG ARGUMENT
// =============================================================================

/// An object or tag argument at the public edge of the index.
///
/// Callers may pass either raw blob content or an identifier they already
/// hold. `Raw` triggers a digest (and an identity-store write on mutation);
/// `Resolved` skips both. The interior of the index operates exclusively
/// on [`Id`]s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Item {
    /// Raw blob content. The identifier is computed from the content hash.
    Raw(Vec<u8>),
    /// A pre-resolved identifier.
    Resolved(Id),
}

impl Item {
    /// The identifier this item denotes.
    #[must_use]
    pub fn id(&self) -> Id {
        match self {
            Item::Raw(blob) => Id::digest(blob),
            Item::Resolved(id) => *id,
        }
    }

    /// The raw blob content, if this item carries any.
    #[must_use]
    pub fn blob(&self) -> Option<&[u8]> {
        match self {
            Item::Raw(blob) => Some(blob),
            Item::Resolved(_) => None,
        }
    }
}

impl From<Id> for Item {
    fn from(id: Id) -> Self {
        Item::Resolved(id)
    }
}

impl From<Vec<u8>> for Item {
    fn from(blob: Vec<u8>) -> Self {
        Item::Raw(blob)
    }
}

impl From<&[u8]> for Item {
    fn from(blob: &[u8]) -> Self {
        Item::Raw(blob.to_vec())
    }
}

impl From<&str> for Item {
    fn from(blob: &str) -> Self {
        Item::Raw(blob.as_bytes().to_vec())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the tagstore index.
///
/// Absent rows on public lookups are not errors; they surface as `Option`
/// or empty results. No operation retries internally: every failure
/// propagates to the caller and a failed transaction leaves the store
/// unchanged.
#[derive(Debug, Error)]
pub enum TagstoreError {
    /// The caller supplied input the index cannot accept: an empty present
    /// list on a search, an empty or oversized blob, a malformed id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The storage layer failed (I/O, commit). The operation is aborted;
    /// the caller may retry.
    #[error("storage error: {0}")]
    Storage(String),

    /// A structural invariant of the index was violated on read, e.g. a
    /// posting entry with no matching count row.
    #[error("index corruption: {0}")]
    Corruption(String),

    /// The database was written by an incompatible version of the schema.
    #[error("unsupported on-disk format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

impl From<redb::DatabaseError> for TagstoreError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for TagstoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for TagstoreError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for TagstoreError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for TagstoreError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CompactionError> for TagstoreError {
    fn from(e: redb::CompactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
