//! # Database Handle
//!
//! A disk-backed tag index over the redb embedded database, providing:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! Opening a store creates all tables and stamps the on-disk format
//! version; reopening checks the stamp and refuses incompatible files.

use crate::primitives::FORMAT_VERSION;
use crate::schema;
use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::types::TagstoreError;
use redb::{Database, ReadableDatabase, ReadableTable};
use std::path::Path;

/// A persistent tag index.
///
/// Owns the underlying [`redb::Database`]. All reads and writes go through
/// transactions created by [`begin_read`](Self::begin_read) and
/// [`begin_write`](Self::begin_write); the store itself keeps no in-memory
/// state.
pub struct TagStore {
    db: Database,
}

impl std::fmt::Debug for TagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagStore").finish_non_exhaustive()
    }
}

impl TagStore {
    /// Open or create a tag index at the given path.
    ///
    /// Returns [`TagstoreError::UnsupportedVersion`] when the file was
    /// written by an incompatible schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TagstoreError> {
        let db = Database::create(path.as_ref())?;
        let store = Self { db };
        store.init()?;
        Ok(store)
    }

    /// Create all tables and verify the format version stamp.
    fn init(&self) -> Result<(), TagstoreError> {
        let txn = self.db.begin_write()?;
        {
            let _ = txn.open_table(schema::TAG_OBJECT)?;
            let _ = txn.open_table(schema::OBJECT_TAG)?;
            let _ = txn.open_table(schema::ID_BLOB)?;
            let _ = txn.open_table(schema::TAG_COUNT)?;
            let _ = txn.open_table(schema::OBJECT_COUNT)?;
            let mut meta = txn.open_table(schema::META)?;
            let stamped = meta
                .get(schema::FORMAT_VERSION_KEY)?
                .map(|guard| guard.value());
            match stamped {
                None => {
                    meta.insert(schema::FORMAT_VERSION_KEY, FORMAT_VERSION)?;
                }
                Some(found) if found == FORMAT_VERSION => {}
                Some(found) => {
                    return Err(TagstoreError::UnsupportedVersion {
                        found,
                        expected: FORMAT_VERSION,
                    });
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Begin a read-only snapshot transaction.
    pub fn begin_read(&self) -> Result<ReadTransaction, TagstoreError> {
        Ok(ReadTransaction {
            txn: self.db.begin_read()?,
        })
    }

    /// Begin a read/write transaction. Blocks while another write
    /// transaction is active.
    pub fn begin_write(&self) -> Result<WriteTransaction, TagstoreError> {
        Ok(WriteTransaction {
            txn: self.db.begin_write()?,
        })
    }

    /// Remove every entry from every table, keeping the format stamp.
    ///
    /// Intended for tests and tooling; runs as one atomic transaction.
    pub fn clear(&self) -> Result<(), TagstoreError> {
        let txn = self.db.begin_write()?;
        txn.delete_table(schema::TAG_OBJECT)?;
        txn.delete_table(schema::OBJECT_TAG)?;
        txn.delete_table(schema::ID_BLOB)?;
        txn.delete_table(schema::TAG_COUNT)?;
        txn.delete_table(schema::OBJECT_COUNT)?;
        txn.delete_table(schema::META)?;
        {
            let _ = txn.open_table(schema::TAG_OBJECT)?;
            let _ = txn.open_table(schema::OBJECT_TAG)?;
            let _ = txn.open_table(schema::ID_BLOB)?;
            let _ = txn.open_table(schema::TAG_COUNT)?;
            let _ = txn.open_table(schema::OBJECT_COUNT)?;
            let mut meta = txn.open_table(schema::META)?;
            meta.insert(schema::FORMAT_VERSION_KEY, FORMAT_VERSION)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Compact the database file (space reclamation).
    pub fn compact(&mut self) -> Result<bool, TagstoreError> {
        Ok(self.db.compact()?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
