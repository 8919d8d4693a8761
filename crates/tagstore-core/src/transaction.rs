//! # Transactions
//!
//! The read and write façades over one underlying redb transaction.
//!
//! A [`WriteTransaction`] batches any number of mutations and queries;
//! nothing is visible to other transactions until [`WriteTransaction::commit`].
//! Dropping a transaction without committing discards all of its writes.
//! Reads inside a write transaction observe that transaction's earlier
//! writes.
//!
//! ## Counter upkeep
//!
//! Every cardinality change goes through [`bump_count`] / [`drop_count`].
//! A decrement that finds no row is index corruption, not a no-op: the
//! error propagates and the transaction aborts. Count rows are removed
//! when they reach zero, so a missing row always means zero.

use crate::primitives::{ID_LEN, MAX_BLOB_LEN, MAX_QUERY_TAGS};
use crate::query::Query;
use crate::schema::{self, CountValue, IdKey, PostingKey};
use crate::search;
use crate::types::{Id, Item, TagstoreError};
use redb::{ReadableTable, ReadableTableMetadata, Table};
use serde::Serialize;
use std::ops::Bound;

// =============================================================================
// SHARED READ HELPERS
// =============================================================================

fn prefix_bounds(leading: Id) -> (Bound<PostingKey>, Bound<PostingKey>) {
    (
        Bound::Included((leading.0, [0u8; ID_LEN])),
        Bound::Included((leading.0, [0xffu8; ID_LEN])),
    )
}

/// Collect the trailing ids of every posting whose leading id matches.
fn collect_trailing<T>(table: &T, leading: Id) -> Result<Vec<Id>, TagstoreError>
where
    T: ReadableTable<PostingKey, ()>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix_bounds(leading))? {
        let (key, _) = entry?;
        out.push(Id(key.value().1));
    }
    Ok(out)
}

fn has_posting<T>(table: &T, leading: Id, trailing: Id) -> Result<bool, TagstoreError>
where
    T: ReadableTable<PostingKey, ()>,
{
    Ok(table.get((leading.0, trailing.0))?.is_some())
}

fn read_count<T>(table: &T, id: Id) -> Result<Option<u32>, TagstoreError>
where
    T: ReadableTable<IdKey, CountValue>,
{
    Ok(table.get(id.0)?.map(|guard| schema::decode_count(guard.value())))
}

/// Validate a mutation argument and resolve its id. `Resolved` items pass
/// through untouched; `Raw` blobs must be non-empty and bounded.
fn checked_id(item: &Item) -> Result<Id, TagstoreError> {
    if let Item::Raw(blob) = item {
        if blob.is_empty() {
            return Err(TagstoreError::InvalidInput("empty blob".into()));
        }
        if blob.len() > MAX_BLOB_LEN {
            return Err(TagstoreError::InvalidInput(format!(
                "blob of {} bytes exceeds the {MAX_BLOB_LEN}-byte limit",
                blob.len()
            )));
        }
    }
    Ok(item.id())
}

fn checked_query_ids(query: &Query) -> Result<(Vec<Id>, Vec<Id>), TagstoreError> {
    if query.present.len() + query.absent.len() > MAX_QUERY_TAGS {
        return Err(TagstoreError::InvalidInput(format!(
            "query names more than {MAX_QUERY_TAGS} tags"
        )));
    }
    let present = query.present.iter().map(Item::id).collect();
    let absent = query.absent.iter().map(Item::id).collect();
    Ok((present, absent))
}

// =============================================================================
// COUNTER HELPERS
// =============================================================================

/// Increment a cardinality counter by `delta`, creating the row at `delta`
/// if it is absent.
fn bump_count(
    table: &mut Table<'_, IdKey, CountValue>,
    id: Id,
    delta: u32,
) -> Result<u32, TagstoreError> {
    let current = table
        .get(id.0)?
        .map(|guard| schema::decode_count(guard.value()))
        .unwrap_or(0);
    let next = current.saturating_add(delta);
    table.insert(id.0, schema::encode_count(next))?;
    Ok(next)
}

/// Decrement a cardinality counter by `delta`, removing the row when it
/// reaches zero.
///
/// A decrement must find a row covering it; anything else means the
/// posting maps and the counter disagree, which is corruption.
fn drop_count(
    table: &mut Table<'_, IdKey, CountValue>,
    id: Id,
    delta: u32,
) -> Result<u32, TagstoreError> {
    let current = match table.get(id.0)? {
        Some(guard) => schema::decode_count(guard.value()),
        None => {
            return Err(TagstoreError::Corruption(format!(
                "count row missing for {id} during decrement"
            )));
        }
    };
    if current < delta {
        return Err(TagstoreError::Corruption(format!(
            "count for {id} is {current}, cannot decrement by {delta}"
        )));
    }
    let next = current - delta;
    if next == 0 {
        table.remove(id.0)?;
    } else {
        table.insert(id.0, schema::encode_count(next))?;
    }
    Ok(next)
}

// =============================================================================
// STATS
// =============================================================================

/// Aggregate table sizes, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of objects bearing at least one tag.
    pub objects: u64,
    /// Number of distinct tags in use.
    pub tags: u64,
    /// Number of (tag, object) posting entries.
    pub postings: u64,
}

// =============================================================================
// READ TRANSACTION
// =============================================================================

/// A read-only snapshot of the index.
///
/// Created via [`TagStore::begin_read`](crate::TagStore::begin_read).
/// Readers never block the writer and observe a consistent snapshot.
pub struct ReadTransaction {
    pub(crate) txn: redb::ReadTransaction,
}

impl ReadTransaction {
    /// Retrieve the original blob for an identifier, if it is still live.
    pub fn resolve(&self, id: Id) -> Result<Option<Vec<u8>>, TagstoreError> {
        let blobs = self.txn.open_table(schema::ID_BLOB)?;
        let value = blobs.get(id.0)?.map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Whether the object currently bears the tag.
    pub fn has_tag(&self, object: &Item, tag: &Item) -> Result<bool, TagstoreError> {
        let reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        has_posting(&reverse, object.id(), tag.id())
    }

    /// All tag ids the object bears, in ascending id order.
    pub fn get_tags(&self, object: &Item) -> Result<Vec<Id>, TagstoreError> {
        let reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        collect_trailing(&reverse, object.id())
    }

    /// How many objects bear the tag. Zero when the tag is unknown.
    pub fn tag_cardinality(&self, tag: &Item) -> Result<u32, TagstoreError> {
        let counts = self.txn.open_table(schema::TAG_COUNT)?;
        Ok(read_count(&counts, tag.id())?.unwrap_or(0))
    }

    /// Execute a conjunctive tag search.
    pub fn find(&self, query: &Query) -> Result<Vec<Id>, TagstoreError> {
        let (present, absent) = checked_query_ids(query)?;
        let postings = self.txn.open_table(schema::TAG_OBJECT)?;
        let counts = self.txn.open_table(schema::TAG_COUNT)?;
        search::find_ids(
            &postings,
            &counts,
            &present,
            &absent,
            query.start_after,
            query.limit,
        )
    }

    /// Aggregate index sizes.
    pub fn stats(&self) -> Result<IndexStats, TagstoreError> {
        let postings = self.txn.open_table(schema::TAG_OBJECT)?;
        let tag_counts = self.txn.open_table(schema::TAG_COUNT)?;
        let object_counts = self.txn.open_table(schema::OBJECT_COUNT)?;
        Ok(IndexStats {
            objects: object_counts.len()?,
            tags: tag_counts.len()?,
            postings: postings.len()?,
        })
    }
}

// =============================================================================
// WRITE TRANSACTION
// =============================================================================

/// A read/write transaction over the index.
///
/// Created via [`TagStore::begin_write`](crate::TagStore::begin_write).
/// All mutations become visible atomically at [`commit`](Self::commit);
/// dropping the transaction without committing aborts it.
pub struct WriteTransaction {
    pub(crate) txn: redb::WriteTransaction,
}

impl WriteTransaction {
    /// Associate an object with a set of tags.
    ///
    /// Already-present (tag, object) pairs are left untouched, so the
    /// operation is idempotent per pair; each tag is handled independently
    /// of the others. Raw blobs are written to the identity store.
    ///
    /// Returns the number of newly created pairs.
    pub fn add(&mut self, object: &Item, tags: &[Item]) -> Result<u32, TagstoreError> {
        let object_id = checked_id(object)?;
        let mut forward = self.txn.open_table(schema::TAG_OBJECT)?;
        let mut reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        let mut blobs = self.txn.open_table(schema::ID_BLOB)?;
        let mut tag_counts = self.txn.open_table(schema::TAG_COUNT)?;
        let mut object_counts = self.txn.open_table(schema::OBJECT_COUNT)?;

        if let Item::Raw(blob) = object {
            blobs.insert(object_id.0, blob.as_slice())?;
        }

        let mut linked = 0u32;
        for tag in tags {
            let tag_id = checked_id(tag)?;
            if has_posting(&forward, tag_id, object_id)? {
                continue;
            }
            forward.insert((tag_id.0, object_id.0), ())?;
            reverse.insert((object_id.0, tag_id.0), ())?;
            if let Item::Raw(blob) = tag {
                if blobs.get(tag_id.0)?.is_none() {
                    blobs.insert(tag_id.0, blob.as_slice())?;
                }
            }
            bump_count(&mut tag_counts, tag_id, 1)?;
            linked += 1;
        }
        if linked > 0 {
            bump_count(&mut object_counts, object_id, linked)?;
        }
        Ok(linked)
    }

    /// Remove an object and every posting that references it.
    ///
    /// Tags whose cardinality drops to zero lose their count row and their
    /// identity row. Returns `false` when the object is unknown.
    pub fn delete(&mut self, object: &Item) -> Result<bool, TagstoreError> {
        let object_id = object.id();
        let mut forward = self.txn.open_table(schema::TAG_OBJECT)?;
        let mut reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        let mut blobs = self.txn.open_table(schema::ID_BLOB)?;
        let mut tag_counts = self.txn.open_table(schema::TAG_COUNT)?;
        let mut object_counts = self.txn.open_table(schema::OBJECT_COUNT)?;

        if object_counts.get(object_id.0)?.is_none() {
            return Ok(false);
        }

        let tags = collect_trailing(&reverse, object_id)?;
        for tag_id in tags {
            if forward.remove((tag_id.0, object_id.0))?.is_none() {
                return Err(TagstoreError::Corruption(format!(
                    "posting ({tag_id}, {object_id}) present in reverse map only"
                )));
            }
            reverse.remove((object_id.0, tag_id.0))?;
            if drop_count(&mut tag_counts, tag_id, 1)? == 0 {
                blobs.remove(tag_id.0)?;
            }
        }
        object_counts.remove(object_id.0)?;
        blobs.remove(object_id.0)?;
        Ok(true)
    }

    /// Remove specific tags from an object.
    ///
    /// When the last posting for the object disappears, the object's count
    /// row and identity row are removed with it. Returns the number of
    /// pairs actually removed.
    pub fn delete_tags(&mut self, object: &Item, tags: &[Item]) -> Result<u32, TagstoreError> {
        let object_id = object.id();
        let mut forward = self.txn.open_table(schema::TAG_OBJECT)?;
        let mut reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        let mut blobs = self.txn.open_table(schema::ID_BLOB)?;
        let mut tag_counts = self.txn.open_table(schema::TAG_COUNT)?;
        let mut object_counts = self.txn.open_table(schema::OBJECT_COUNT)?;

        if object_counts.get(object_id.0)?.is_none() {
            return Ok(0);
        }

        let mut unlinked = 0u32;
        for tag in tags {
            let tag_id = tag.id();
            if forward.remove((tag_id.0, object_id.0))?.is_none() {
                continue;
            }
            if reverse.remove((object_id.0, tag_id.0))?.is_none() {
                return Err(TagstoreError::Corruption(format!(
                    "posting ({tag_id}, {object_id}) present in forward map only"
                )));
            }
            if drop_count(&mut tag_counts, tag_id, 1)? == 0 {
                blobs.remove(tag_id.0)?;
            }
            unlinked += 1;
        }

        if unlinked > 0 {
            let remaining = drop_count(&mut object_counts, object_id, unlinked)?;
            let none_left = {
                let mut rest = reverse.range(prefix_bounds(object_id))?;
                rest.next().transpose()?.is_none()
            };
            match (none_left, remaining == 0) {
                (true, true) => {
                    blobs.remove(object_id.0)?;
                }
                (false, false) => {}
                _ => {
                    return Err(TagstoreError::Corruption(format!(
                        "object count for {object_id} disagrees with its postings"
                    )));
                }
            }
        }
        Ok(unlinked)
    }

    /// Commit every mutation made through this transaction.
    pub fn commit(self) -> Result<(), TagstoreError> {
        self.txn.commit()?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read surface, observing this transaction's own writes.
    // -------------------------------------------------------------------------

    /// Retrieve the original blob for an identifier, if it is still live.
    pub fn resolve(&self, id: Id) -> Result<Option<Vec<u8>>, TagstoreError> {
        let blobs = self.txn.open_table(schema::ID_BLOB)?;
        let value = blobs.get(id.0)?.map(|guard| guard.value().to_vec());
        Ok(value)
    }

    /// Whether the object currently bears the tag.
    pub fn has_tag(&self, object: &Item, tag: &Item) -> Result<bool, TagstoreError> {
        let reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        has_posting(&reverse, object.id(), tag.id())
    }

    /// All tag ids the object bears, in ascending id order.
    pub fn get_tags(&self, object: &Item) -> Result<Vec<Id>, TagstoreError> {
        let reverse = self.txn.open_table(schema::OBJECT_TAG)?;
        collect_trailing(&reverse, object.id())
    }

    /// How many objects bear the tag. Zero when the tag is unknown.
    pub fn tag_cardinality(&self, tag: &Item) -> Result<u32, TagstoreError> {
        let counts = self.txn.open_table(schema::TAG_COUNT)?;
        Ok(read_count(&counts, tag.id())?.unwrap_or(0))
    }

    /// Execute a conjunctive tag search.
    pub fn find(&self, query: &Query) -> Result<Vec<Id>, TagstoreError> {
        let (present, absent) = checked_query_ids(query)?;
        let postings = self.txn.open_table(schema::TAG_OBJECT)?;
        let counts = self.txn.open_table(schema::TAG_COUNT)?;
        search::find_ids(
            &postings,
            &counts,
            &present,
            &absent,
            query.start_after,
            query.limit,
        )
    }

    /// Aggregate index sizes.
    pub fn stats(&self) -> Result<IndexStats, TagstoreError> {
        let postings = self.txn.open_table(schema::TAG_OBJECT)?;
        let tag_counts = self.txn.open_table(schema::TAG_COUNT)?;
        let object_counts = self.txn.open_table(schema::OBJECT_COUNT)?;
        Ok(IndexStats {
            objects: object_counts.len()?,
            tags: tag_counts.len()?,
            postings: postings.len()?,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagStore;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, TagStore) {
        let temp = tempdir().expect("temp dir");
        let store = TagStore::open(temp.path().join("test.redb")).expect("open");
        (temp, store)
    }

    #[test]
    fn add_is_idempotent_per_pair() {
        let (_temp, store) = open_store();
        let o = Item::from("o1");
        let tags = [Item::from("a"), Item::from("b")];

        let mut txn = store.begin_write().expect("write");
        assert_eq!(txn.add(&o, &tags).expect("add"), 2);
        assert_eq!(txn.add(&o, &tags).expect("add again"), 0);
        // Partial overlap: only the new tag links
        assert_eq!(txn.add(&o, &[Item::from("b"), Item::from("c")]).expect("add"), 1);
        txn.commit().expect("commit");

        let txn = store.begin_read().expect("read");
        assert_eq!(txn.get_tags(&o).expect("tags").len(), 3);
        assert_eq!(txn.tag_cardinality(&Item::from("a")).expect("count"), 1);
        let stats = txn.stats().expect("stats");
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.tags, 3);
        assert_eq!(stats.postings, 3);
    }

    #[test]
    fn add_rejects_invalid_blobs() {
        let (_temp, store) = open_store();
        let mut txn = store.begin_write().expect("write");
        let empty = Item::Raw(Vec::new());
        assert!(matches!(
            txn.add(&empty, &[Item::from("a")]),
            Err(TagstoreError::InvalidInput(_))
        ));
        let oversized = Item::Raw(vec![0u8; MAX_BLOB_LEN + 1]);
        assert!(matches!(
            txn.add(&Item::from("o"), &[oversized]),
            Err(TagstoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn delete_unknown_object_is_a_noop() {
        let (_temp, store) = open_store();
        let mut txn = store.begin_write().expect("write");
        assert!(!txn.delete(&Item::from("ghost")).expect("delete"));
        assert_eq!(txn.delete_tags(&Item::from("ghost"), &[Item::from("a")]).expect("dt"), 0);
    }

    #[test]
    fn delete_collects_object_and_orphaned_tags() {
        let (_temp, store) = open_store();
        let o1 = Item::from("o1");
        let o2 = Item::from("o2");

        let mut txn = store.begin_write().expect("write");
        txn.add(&o1, &[Item::from("shared"), Item::from("only-o1")]).expect("add");
        txn.add(&o2, &[Item::from("shared")]).expect("add");
        assert!(txn.delete(&o1).expect("delete"));

        // o1 and its private tag are fully collected
        assert_eq!(txn.resolve(o1.id()).expect("resolve"), None);
        assert_eq!(txn.resolve(Item::from("only-o1").id()).expect("resolve"), None);
        assert_eq!(txn.tag_cardinality(&Item::from("only-o1")).expect("count"), 0);
        // the shared tag survives with its count adjusted
        assert_eq!(txn.tag_cardinality(&Item::from("shared")).expect("count"), 1);
        assert_eq!(
            txn.resolve(Item::from("shared").id()).expect("resolve"),
            Some(b"shared".to_vec())
        );
        txn.commit().expect("commit");
    }

    #[test]
    fn delete_tags_partial_then_full() {
        let (_temp, store) = open_store();
        let o = Item::from("o1");
        let (a, b) = (Item::from("a"), Item::from("b"));

        let mut txn = store.begin_write().expect("write");
        txn.add(&o, &[a.clone(), b.clone()]).expect("add");

        assert_eq!(txn.delete_tags(&o, &[a.clone()]).expect("dt"), 1);
        assert!(txn.resolve(o.id()).expect("resolve").is_some());
        assert!(txn.has_tag(&o, &b).expect("has"));
        assert!(!txn.has_tag(&o, &a).expect("has"));

        // Removing an already-removed tag changes nothing
        assert_eq!(txn.delete_tags(&o, &[a.clone()]).expect("dt"), 0);

        // Last posting gone: the object is garbage-collected
        assert_eq!(txn.delete_tags(&o, &[b.clone()]).expect("dt"), 1);
        assert_eq!(txn.resolve(o.id()).expect("resolve"), None);
        let stats = txn.stats().expect("stats");
        assert_eq!(stats.objects, 0);
        assert_eq!(stats.tags, 0);
        assert_eq!(stats.postings, 0);
    }

    #[test]
    fn resolved_items_skip_the_identity_store() {
        let (_temp, store) = open_store();
        let blob = Item::from("opaque");
        let id = blob.id();

        let mut txn = store.begin_write().expect("write");
        txn.add(&Item::Resolved(id), &[Item::from("a")]).expect("add");
        // Added by id only: nothing to resolve
        assert_eq!(txn.resolve(id).expect("resolve"), None);
        // A later add by blob fills the identity row in
        txn.add(&blob, &[Item::from("a")]).expect("add");
        assert_eq!(txn.resolve(id).expect("resolve"), Some(b"opaque".to_vec()));
    }

    #[test]
    fn writes_are_visible_within_the_transaction() {
        let (_temp, store) = open_store();
        let o = Item::from("o1");
        let mut txn = store.begin_write().expect("write");
        txn.add(&o, &[Item::from("a")]).expect("add");
        assert!(txn.has_tag(&o, &Item::from("a")).expect("has"));
        assert_eq!(
            txn.find(&Query::all_of(["a"])).expect("find"),
            vec![o.id()]
        );
    }

    #[test]
    fn drop_without_commit_discards_writes() {
        let (_temp, store) = open_store();
        {
            let mut txn = store.begin_write().expect("write");
            txn.add(&Item::from("o1"), &[Item::from("a")]).expect("add");
            // dropped here without commit
        }
        let txn = store.begin_read().expect("read");
        assert_eq!(txn.stats().expect("stats").postings, 0);
        assert!(txn.find(&Query::all_of(["a"])).expect("find").is_empty());
    }

    #[test]
    fn oversized_query_is_rejected() {
        let (_temp, store) = open_store();
        let txn = store.begin_read().expect("read");
        let present: Vec<String> = (0..=MAX_QUERY_TAGS).map(|i| format!("t{i}")).collect();
        let query = Query::all_of(present.iter().map(String::as_str));
        assert!(matches!(
            txn.find(&query),
            Err(TagstoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn counter_helpers_enforce_the_decrement_contract() {
        let (_temp, store) = open_store();
        let txn = store.begin_write().expect("write");
        let id = Id::digest(b"counter");
        {
            let mut counts = txn.txn.open_table(schema::TAG_COUNT).expect("table");
            assert_eq!(bump_count(&mut counts, id, 2).expect("bump"), 2);
            assert_eq!(drop_count(&mut counts, id, 1).expect("drop"), 1);
            // Reaches zero: the row disappears
            assert_eq!(drop_count(&mut counts, id, 1).expect("drop"), 0);
            assert!(counts.get(id.0).expect("get").is_none());
            // Decrementing an absent row is corruption
            assert!(matches!(
                drop_count(&mut counts, id, 1),
                Err(TagstoreError::Corruption(_))
            ));
        }
    }
}
