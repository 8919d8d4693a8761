//! # tagstore-core
//!
//! A persistent tag index: opaque byte-blob objects, each bearing an
//! unordered set of opaque byte-blob tags, searchable by conjunctive
//! queries ("objects bearing every tag in P and none of the tags in N"),
//! paginated and bounded.
//!
//! The index is an embeddable library over the redb ordered key-value
//! store. Tag search reduces to range scans over two symmetric posting
//! tables; multi-tag queries run a cursor-coordinated intersection that
//! never materialises a posting list in memory.
//!
//! ## Usage
//!
//! ```no_run
//! use tagstore_core::{Item, Query, TagStore};
//!
//! # fn main() -> Result<(), tagstore_core::TagstoreError> {
//! let store = TagStore::open("index.redb")?;
//!
//! let mut txn = store.begin_write()?;
//! txn.add(&Item::from("report.pdf"), &[Item::from("pdf"), Item::from("2026")])?;
//! txn.commit()?;
//!
//! let txn = store.begin_read()?;
//! let hits = txn.find(&Query::all_of(["pdf"]).without(["archived"]))?;
//! for id in hits {
//!     println!("{id}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architectural Constraints
//!
//! - Synchronous: no async, no network dependencies
//! - No in-memory caches: cursors and small counters are the only state
//!   of an in-flight query; the database owns all persisted bytes
//! - Deterministic: identifiers are content hashes and results are
//!   emitted in ascending id order, so pagination is exact

// =============================================================================
// MODULES
// =============================================================================

pub mod primitives;
pub mod query;
pub mod store;
pub mod transaction;
pub mod types;

mod schema;
mod search;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use query::Query;
pub use store::TagStore;
pub use transaction::{IndexStats, ReadTransaction, WriteTransaction};
pub use types::{Id, Item, TagstoreError};
