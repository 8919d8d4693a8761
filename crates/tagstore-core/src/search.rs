//! # Tag Search
//!
//! Scan planning and execution over the posting tables.
//!
//! A search never materialises a posting list. The single-tag case is one
//! range walk (§ single-tag scan); the k-tag case coordinates k cursors,
//! one per present tag, and advances them against each other until they
//! all park on the same object id (§ multi-cursor AND-scan). Both emit
//! object ids in ascending order, which is what makes `start_after`
//! pagination exact.
//!
//! ## Planning
//!
//! Present tags are visited in ascending cardinality order so the rarest
//! tag drives the primary cursor: every emitted object must appear in the
//! shortest posting list, which bounds the number of primary advances.
//! Absent tags are visited in descending cardinality order: a common
//! absent tag rejects a candidate fastest, and the first hit
//! short-circuits.
//!
//! ## The cursor state machine
//!
//! The intersection is an explicit state machine over a small vector of
//! cursors and two rotating indices, not nested iterator adapters: the
//! rotation, the termination conditions, and the reseat-on-mismatch step
//! are the algorithm, and they need to be visible to be auditable.

use crate::primitives::ID_LEN;
use crate::schema::{self, CountValue, IdKey, PostingKey};
use crate::types::{Id, TagstoreError};
use redb::ReadableTable;
use std::ops::Bound;

// =============================================================================
// PLANNING
// =============================================================================

/// Execute a search over resolved tag ids.
///
/// `present` must be non-empty. Returns matching object ids in ascending
/// order, at most `limit` of them, starting strictly after `start_after`
/// when given.
pub(crate) fn find_ids<P, C>(
    postings: &P,
    tag_counts: &C,
    present: &[Id],
    absent: &[Id],
    start_after: Option<Id>,
    limit: Option<usize>,
) -> Result<Vec<Id>, TagstoreError>
where
    P: ReadableTable<PostingKey, ()>,
    C: ReadableTable<IdKey, CountValue>,
{
    if present.is_empty() {
        return Err(TagstoreError::InvalidInput(
            "search requires at least one present tag".into(),
        ));
    }
    let limit = limit.unwrap_or(usize::MAX);
    if limit == 0 {
        return Ok(Vec::new());
    }

    // Absent tags with no recorded cardinality have no postings and cannot
    // reject anything; drop them. The rest are checked most-common-first.
    let mut absent_plan = Vec::with_capacity(absent.len());
    for &tag in absent {
        if let Some(count) = read_cardinality(tag_counts, tag)? {
            absent_plan.push((count, tag));
        }
    }
    absent_plan.sort_unstable_by(|a, b| b.cmp(a));
    let absent_plan: Vec<Id> = absent_plan.into_iter().map(|(_, tag)| tag).collect();

    // A present tag with no recorded cardinality has an empty posting
    // list, so the intersection is empty.
    let mut present_plan = Vec::with_capacity(present.len());
    for &tag in present {
        match read_cardinality(tag_counts, tag)? {
            Some(count) => present_plan.push((count, tag)),
            None => return Ok(Vec::new()),
        }
    }
    present_plan.sort_unstable();
    let present_plan: Vec<Id> = present_plan.into_iter().map(|(_, tag)| tag).collect();

    let mut results = Vec::new();
    if present_plan.len() == 1 {
        scan_single(
            postings,
            present_plan[0],
            &absent_plan,
            start_after,
            limit,
            &mut results,
        )?;
    } else {
        let mut scan = AndScan::new(postings, present_plan, absent_plan, start_after);
        while let Some(object) = scan.next()? {
            results.push(object);
            if results.len() == limit {
                break;
            }
        }
    }
    Ok(results)
}

fn read_cardinality<C>(tag_counts: &C, tag: Id) -> Result<Option<u32>, TagstoreError>
where
    C: ReadableTable<IdKey, CountValue>,
{
    Ok(tag_counts
        .get(tag.0)?
        .map(|guard| schema::decode_count(guard.value())))
}

/// The bounds of a posting range for one leading id, optionally resuming
/// after a trailing id. Keys are fixed width, so the prefix edge is the
/// inclusive upper bound `(leading, MAX)`.
fn posting_bounds(leading: Id, resume: Bound<Id>) -> (Bound<PostingKey>, Bound<PostingKey>) {
    let lower = match resume {
        Bound::Included(trailing) => Bound::Included((leading.0, trailing.0)),
        Bound::Excluded(trailing) => Bound::Excluded((leading.0, trailing.0)),
        Bound::Unbounded => Bound::Included((leading.0, [0u8; ID_LEN])),
    };
    (lower, Bound::Included((leading.0, [0xffu8; ID_LEN])))
}

/// True if any absent tag rejects the candidate. Checked most-common-first
/// with one point lookup per absent tag; the first hit short-circuits.
fn rejected<P>(postings: &P, absent: &[Id], object: Id) -> Result<bool, TagstoreError>
where
    P: ReadableTable<PostingKey, ()>,
{
    for &tag in absent {
        if postings.get((tag.0, object.0))?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

// =============================================================================
// SINGLE-TAG SCAN
// =============================================================================

/// Walk one tag's posting range, rejecting candidates that bear an absent
/// tag, until the range or the limit is exhausted.
fn scan_single<P>(
    postings: &P,
    tag: Id,
    absent: &[Id],
    start_after: Option<Id>,
    limit: usize,
    results: &mut Vec<Id>,
) -> Result<(), TagstoreError>
where
    P: ReadableTable<PostingKey, ()>,
{
    let resume = match start_after {
        Some(object) => Bound::Excluded(object),
        None => Bound::Unbounded,
    };
    for entry in postings.range(posting_bounds(tag, resume))? {
        let (key, _) = entry?;
        let object = Id(key.value().1);
        if rejected(postings, absent, object)? {
            continue;
        }
        results.push(object);
        if results.len() == limit {
            break;
        }
    }
    Ok(())
}

// =============================================================================
// MULTI-CURSOR AND-SCAN
// =============================================================================

/// A cursor over one tag's posting range, parked on the trailing object id
/// of its current entry. `None` means the range is exhausted: the cursor
/// ran off the end of its tag's postings.
struct PostingCursor<'a> {
    range: redb::Range<'a, PostingKey, ()>,
    current: Option<Id>,
}

impl<'a> PostingCursor<'a> {
    fn open<P>(postings: &'a P, tag: Id, resume: Bound<Id>) -> Result<Self, TagstoreError>
    where
        P: ReadableTable<PostingKey, ()>,
    {
        let range = postings.range(posting_bounds(tag, resume))?;
        let mut cursor = Self {
            range,
            current: None,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    fn advance(&mut self) -> Result<(), TagstoreError> {
        self.current = match self.range.next() {
            Some(entry) => {
                let (key, _) = entry?;
                Some(Id(key.value().1))
            }
            None => None,
        };
        Ok(())
    }
}

/// Cursor-coordinated intersection of two or more posting lists.
///
/// One cursor per present tag, created lazily; `present[0]` is the rarest
/// tag and owns the primary cursor. Two rotating indices `index_1` and
/// `index_2` pick the pair currently being reconciled. Each iteration
/// either emits a match (all cursors parked on the same object), advances
/// the chasing cursor toward the leading one, or re-seats the primary
/// cursor when a new frontier is established. Cursor positions are
/// monotone non-decreasing and bounded by their posting ranges, so the
/// scan halts.
struct AndScan<'a, P: ReadableTable<PostingKey, ()>> {
    postings: &'a P,
    /// Present tag ids, ascending by cardinality. Length k >= 2.
    present: Vec<Id>,
    /// Absent tag ids, descending by cardinality.
    absent: Vec<Id>,
    start_after: Option<Id>,
    cursors: Vec<PostingCursor<'a>>,
    index_1: usize,
    index_2: usize,
    done: bool,
}

impl<'a, P: ReadableTable<PostingKey, ()>> AndScan<'a, P> {
    fn new(postings: &'a P, present: Vec<Id>, absent: Vec<Id>, start_after: Option<Id>) -> Self {
        debug_assert!(present.len() >= 2);
        Self {
            postings,
            present,
            absent,
            start_after,
            cursors: Vec::new(),
            index_1: 0,
            index_2: 1,
            done: false,
        }
    }

    /// The largest object id any live cursor is parked on. Every result
    /// from here on must be >= the frontier, so it is the correct seed
    /// for a newly opened cursor.
    fn frontier(&self) -> Id {
        self.cursors
            .iter()
            .filter_map(|cursor| cursor.current)
            .max()
            .unwrap_or(Id::MIN)
    }

    fn next(&mut self) -> Result<Option<Id>, TagstoreError> {
        if self.done {
            return Ok(None);
        }
        loop {
            // Match check: every cursor opened and parked on one object.
            if self.cursors.len() == self.present.len() {
                let candidate = self.cursors[0].current;
                if let Some(object) = candidate {
                    if self.cursors.iter().all(|c| c.current == Some(object)) {
                        self.cursors[0].advance()?;
                        if self.cursors[0].current.is_none() {
                            self.done = true;
                        }
                        self.index_1 = 0;
                        self.index_2 = 1;
                        if !rejected(self.postings, &self.absent, object)? {
                            return Ok(Some(object));
                        }
                        // Rejected by an absent tag: keep scanning.
                        if self.done {
                            return Ok(None);
                        }
                        continue;
                    }
                }
            }

            // Lazy cursor creation. Slots are opened in order, seeded at
            // the frontier; the primary seeds at the pagination cursor.
            if self.cursors.len() < self.present.len() && self.cursors.len() <= self.index_1 {
                let resume = if self.index_1 == 0 {
                    match self.start_after {
                        Some(object) => Bound::Excluded(object),
                        None => Bound::Unbounded,
                    }
                } else {
                    Bound::Included(self.frontier())
                };
                let cursor = PostingCursor::open(self.postings, self.present[self.index_1], resume)?;
                if cursor.current.is_none() {
                    self.done = true;
                    return Ok(None);
                }
                self.cursors.push(cursor);
            }
            if self.cursors.len() < self.present.len() && self.cursors.len() <= self.index_2 {
                let resume = Bound::Included(self.frontier());
                let cursor = PostingCursor::open(self.postings, self.present[self.index_2], resume)?;
                if cursor.current.is_none() {
                    self.done = true;
                    return Ok(None);
                }
                self.cursors.push(cursor);
            }

            // Pairwise catch-up: advance the chasing cursor until it
            // reaches or passes the leading one.
            let lead = match self.cursors[self.index_1].current {
                Some(object) => object,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            };
            let chase = loop {
                match self.cursors[self.index_2].current {
                    Some(object) if object < lead => self.cursors[self.index_2].advance()?,
                    Some(object) => break object,
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
            };

            if chase == lead {
                // The pair agrees; rotate to reconcile the next pair.
                self.index_1 = (self.index_1 + 1) % self.present.len();
                self.index_2 = (self.index_2 + 1) % self.present.len();
            } else {
                // chase > lead: a new frontier. Re-seat the primary cursor
                // and restart the rotation from it.
                loop {
                    match self.cursors[0].current {
                        Some(object) if object < chase => self.cursors[0].advance()?,
                        Some(_) => break,
                        None => {
                            self.done = true;
                            return Ok(None);
                        }
                    }
                }
                self.index_1 = 0;
                self.index_2 = 1;
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Id, Item, Query, TagStore, TagstoreError};
    use tempfile::tempdir;

    fn store_with(entries: &[(&str, &[&str])]) -> (tempfile::TempDir, TagStore) {
        let temp = tempdir().expect("temp dir");
        let store = TagStore::open(temp.path().join("test.redb")).expect("open");
        let mut txn = store.begin_write().expect("begin write");
        for (object, tags) in entries {
            let tags: Vec<Item> = tags.iter().map(|&t| Item::from(t)).collect();
            txn.add(&Item::from(*object), &tags).expect("add");
        }
        txn.commit().expect("commit");
        (temp, store)
    }

    fn ids_of(blobs: &[&str]) -> Vec<Id> {
        let mut ids: Vec<Id> = blobs.iter().map(|b| Id::digest(b.as_bytes())).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn empty_present_is_invalid() {
        let (_temp, store) = store_with(&[("o1", ["a"].as_slice())]);
        let txn = store.begin_read().expect("read");
        let err = txn.find(&Query::default()).expect_err("must fail");
        assert!(matches!(err, TagstoreError::InvalidInput(_)));
    }

    #[test]
    fn unknown_present_tag_yields_empty() {
        let (_temp, store) = store_with(&[("o1", ["a"].as_slice())]);
        let txn = store.begin_read().expect("read");
        assert!(txn.find(&Query::all_of(["never-seen"])).expect("find").is_empty());
        // Mixed known/unknown behaves the same
        assert!(
            txn.find(&Query::all_of(["a", "never-seen"]))
                .expect("find")
                .is_empty()
        );
    }

    #[test]
    fn two_tag_intersection_ascending() {
        let (_temp, store) = store_with(&[
            ("o1", ["a"].as_slice()),
            ("o2", ["a", "b"].as_slice()),
            ("o3", ["a", "b", "c"].as_slice()),
        ]);
        let txn = store.begin_read().expect("read");
        assert_eq!(txn.find(&Query::all_of(["a", "b"])).expect("find"), ids_of(&["o2", "o3"]));
        assert_eq!(
            txn.find(&Query::all_of(["a", "b", "c"])).expect("find"),
            ids_of(&["o3"])
        );
    }

    #[test]
    fn duplicate_present_tag_is_harmless() {
        let (_temp, store) = store_with(&[("o1", ["a"].as_slice()), ("o2", ["a", "b"].as_slice())]);
        let txn = store.begin_read().expect("read");
        assert_eq!(txn.find(&Query::all_of(["a", "a"])).expect("find"), ids_of(&["o1", "o2"]));
    }

    #[test]
    fn absent_rejection_does_not_end_the_scan() {
        // Rejected candidates interleave with emitted ones in id order, so
        // the scan must keep going past every rejection.
        let objects: Vec<String> = (0..20).map(|i| format!("mix-{i}")).collect();
        static KEPT: &[&str] = &["p", "q"];
        static SKIPPED: &[&str] = &["p", "q", "skip"];
        let entries: Vec<(&str, &[&str])> = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.as_str(), if i % 2 == 0 { SKIPPED } else { KEPT }))
            .collect();
        let (_temp, store) = store_with(&entries);
        let txn = store.begin_read().expect("read");

        let expected: Vec<Id> = {
            let mut ids: Vec<Id> = objects
                .iter()
                .enumerate()
                .filter(|(i, _)| i % 2 != 0)
                .map(|(_, o)| Id::digest(o.as_bytes()))
                .collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(
            txn.find(&Query::all_of(["p", "q"]).without(["skip"])).expect("find"),
            expected
        );
    }

    #[test]
    fn absent_filter_on_multi_tag_scan() {
        let (_temp, store) = store_with(&[
            ("o1", ["a"].as_slice()),
            ("o2", ["a", "b"].as_slice()),
            ("o3", ["a", "b", "c"].as_slice()),
        ]);
        let txn = store.begin_read().expect("read");
        assert_eq!(
            txn.find(&Query::all_of(["a", "b"]).without(["c"])).expect("find"),
            ids_of(&["o2"])
        );
        assert!(
            txn.find(&Query::all_of(["a", "b"]).without(["b"]))
                .expect("find")
                .is_empty()
        );
    }

    #[test]
    fn three_tag_intersection() {
        let objects: Vec<String> = (0..40).map(|i| format!("object-{i}")).collect();
        let mut entries: Vec<(&str, &[&str])> = Vec::new();
        static EVERY: &[&str] = &["x"];
        static EVENS: &[&str] = &["x", "y"];
        static THIRDS: &[&str] = &["x", "y", "z"];
        for (i, object) in objects.iter().enumerate() {
            let tags = if i % 6 == 0 {
                THIRDS
            } else if i % 2 == 0 {
                EVENS
            } else {
                EVERY
            };
            entries.push((object.as_str(), tags));
        }
        let (_temp, store) = store_with(&entries);
        let txn = store.begin_read().expect("read");

        let expected: Vec<Id> = {
            let mut ids: Vec<Id> = objects
                .iter()
                .enumerate()
                .filter(|(i, _)| i % 6 == 0)
                .map(|(_, o)| Id::digest(o.as_bytes()))
                .collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(txn.find(&Query::all_of(["x", "y", "z"])).expect("find"), expected);
    }

    #[test]
    fn pagination_resumes_exactly() {
        static BOTH: &[&str] = &["p", "q"];
        let objects: Vec<String> = (0..30).map(|i| format!("page-{i}")).collect();
        let entries: Vec<(&str, &[&str])> =
            objects.iter().map(|o| (o.as_str(), BOTH)).collect();
        let (_temp, store) = store_with(&entries);
        let txn = store.begin_read().expect("read");

        let full = txn.find(&Query::all_of(["p", "q"])).expect("find");
        assert_eq!(full.len(), 30);

        let mut paged = Vec::new();
        let mut cursor: Option<Id> = None;
        loop {
            let mut query = Query::all_of(["p", "q"]).limit(7);
            if let Some(after) = cursor {
                query = query.after(after);
            }
            let batch = txn.find(&query).expect("find");
            if batch.is_empty() {
                break;
            }
            assert!(batch.len() <= 7);
            cursor = batch.last().copied();
            paged.extend(batch);
        }
        assert_eq!(paged, full);
    }

    #[test]
    fn limit_truncates_multi_tag_results() {
        static BOTH: &[&str] = &["p", "q"];
        let objects: Vec<String> = (0..20).map(|i| format!("lim-{i}")).collect();
        let entries: Vec<(&str, &[&str])> =
            objects.iter().map(|o| (o.as_str(), BOTH)).collect();
        let (_temp, store) = store_with(&entries);
        let txn = store.begin_read().expect("read");

        let full = txn.find(&Query::all_of(["p", "q"])).expect("find");
        let capped = txn.find(&Query::all_of(["p", "q"]).limit(3)).expect("find");
        assert_eq!(capped, full[..3]);
        assert!(
            txn.find(&Query::all_of(["p", "q"]).limit(0))
                .expect("find")
                .is_empty()
        );
    }
}
