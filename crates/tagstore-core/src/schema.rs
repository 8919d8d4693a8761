//! # Table Layout
//!
//! The on-disk schema: six redb tables keyed by fixed-width identifiers.
//!
//! All identifier keys are exactly [`ID_LEN`] bytes and tuple keys order
//! element-wise with byte-lexicographic element order, so "all entries with
//! leading id X" is the contiguous range `(X, MIN) ..= (X, MAX)` and
//! concatenated keys are unambiguous.
//!
//! | Table          | Key                      | Value                  |
//! |----------------|--------------------------|------------------------|
//! | `tag_object`   | (tag_id, object_id)      | ()                     |
//! | `object_tag`   | (object_id, tag_id)      | ()                     |
//! | `id_blob`      | id                       | original blob bytes    |
//! | `tag_count`    | tag_id                   | u32, big-endian        |
//! | `object_count` | object_id                | u32, big-endian        |
//! | `meta`         | string                   | u32                    |
//!
//! `tag_object` and `object_tag` are symmetric adjacency maps: an entry
//! exists in one iff the mirrored entry exists in the other. `tag_count`
//! holds the cardinality of each tag's posting list; rows are removed when
//! the count reaches zero, so a missing row means zero. The `meta` table
//! carries the format version marker.

use crate::primitives::ID_LEN;
use redb::TableDefinition;

/// Key type for the identity and counter tables.
pub(crate) type IdKey = [u8; ID_LEN];

/// Key type for the posting tables: a leading and a trailing identifier.
pub(crate) type PostingKey = ([u8; ID_LEN], [u8; ID_LEN]);

/// Big-endian u32 wire form of a cardinality counter.
pub(crate) type CountValue = [u8; 4];

/// Forward posting map: (tag_id, object_id) -> ().
pub(crate) const TAG_OBJECT: TableDefinition<PostingKey, ()> = TableDefinition::new("tag_object");

/// Reverse posting map: (object_id, tag_id) -> ().
pub(crate) const OBJECT_TAG: TableDefinition<PostingKey, ()> = TableDefinition::new("object_tag");

/// Identity store: id -> original blob.
pub(crate) const ID_BLOB: TableDefinition<IdKey, &[u8]> = TableDefinition::new("id_blob");

/// Tag cardinality: tag_id -> number of objects bearing the tag.
pub(crate) const TAG_COUNT: TableDefinition<IdKey, CountValue> = TableDefinition::new("tag_count");

/// Object degree: object_id -> number of tags the object bears.
pub(crate) const OBJECT_COUNT: TableDefinition<IdKey, CountValue> =
    TableDefinition::new("object_count");

/// Database metadata: named u32 rows.
pub(crate) const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

/// Row name under [`META`] holding the on-disk format version.
pub(crate) const FORMAT_VERSION_KEY: &str = "format_version";

/// Encode a cardinality counter for storage.
pub(crate) fn encode_count(count: u32) -> CountValue {
    count.to_be_bytes()
}

/// Decode a stored cardinality counter.
pub(crate) fn decode_count(raw: CountValue) -> u32 {
    u32::from_be_bytes(raw)
}
