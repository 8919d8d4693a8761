//! # Runtime Constants
//!
//! Hardcoded limits and format markers for the tagstore core.
//!
//! These are compiled into the binary and immutable at runtime.

/// Width in bytes of an [`Id`](crate::Id).
///
/// Every identifier is the 128-bit content hash of a blob; all key
/// encodings in the schema rely on this width being fixed, which is what
/// makes concatenated posting keys unambiguous.
pub const ID_LEN: usize = 16;

/// Maximum length in bytes for a stored blob (object or tag content).
///
/// Blobs longer than this (64KB) are rejected by the mutation API.
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_BLOB_LEN: usize = 65536;

/// Maximum combined number of present and absent tags in a single query.
///
/// Limits the computational cost of a search (one cursor per present tag,
/// one point lookup per absent tag per candidate).
pub const MAX_QUERY_TAGS: usize = 64;

/// Current on-disk format version.
///
/// Stored in the `meta` table when a database is created and checked on
/// every open. Increment this when making breaking changes to the table
/// layout or key encodings.
pub const FORMAT_VERSION: u32 = 1;
