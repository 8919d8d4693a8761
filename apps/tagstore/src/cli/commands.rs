//! # Command Implementations
//!
//! One function per CLI command. Each opens the store, runs one
//! transaction, and prints either human-readable text or JSON.

use std::path::Path;
use tagstore_core::{Id, Item, Query, TagStore, TagstoreError};
use tracing::info;

/// Parse an object or tag argument.
///
/// `id:<32 hex chars>` denotes a pre-resolved identifier; anything else is
/// raw UTF-8 blob content.
fn parse_item(arg: &str) -> Result<Item, TagstoreError> {
    match arg.strip_prefix("id:") {
        Some(hex_id) => Ok(Item::Resolved(parse_id(hex_id)?)),
        None => Ok(Item::from(arg)),
    }
}

/// Parse a bare hex identifier.
fn parse_id(arg: &str) -> Result<Id, TagstoreError> {
    let bytes = hex::decode(arg)
        .map_err(|e| TagstoreError::InvalidInput(format!("malformed hex id {arg:?}: {e}")))?;
    Id::from_slice(&bytes)
}

fn parse_items(args: &[String]) -> Result<Vec<Item>, TagstoreError> {
    args.iter().map(|arg| parse_item(arg)).collect()
}

/// Render a resolved blob for display: UTF-8 when it is, hex otherwise.
fn render_blob(blob: &[u8]) -> String {
    match std::str::from_utf8(blob) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(blob)),
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

pub fn cmd_init(database: &Path, force: bool) -> Result<(), TagstoreError> {
    if database.exists() {
        if !force {
            return Err(TagstoreError::InvalidInput(format!(
                "{} already exists (use --force to recreate)",
                database.display()
            )));
        }
        std::fs::remove_file(database)
            .map_err(|e| TagstoreError::Storage(format!("cannot remove old index: {e}")))?;
    }
    TagStore::open(database)?;
    info!(path = %database.display(), "index created");
    println!("Created index at {}", database.display());
    Ok(())
}

pub fn cmd_status(database: &Path, json: bool) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;
    let stats = store.begin_read()?.stats()?;
    if json {
        println!("{}", serde_json::json!(stats));
    } else {
        println!("Index: {}", database.display());
        println!("  objects:  {}", stats.objects);
        println!("  tags:     {}", stats.tags);
        println!("  postings: {}", stats.postings);
    }
    Ok(())
}

pub fn cmd_add(
    database: &Path,
    json: bool,
    object: &str,
    tags: &[String],
) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;
    let object = parse_item(object)?;
    let tags = parse_items(tags)?;

    let mut txn = store.begin_write()?;
    let linked = txn.add(&object, &tags)?;
    txn.commit()?;

    info!(object = %object.id(), linked, "object tagged");
    if json {
        println!(
            "{}",
            serde_json::json!({ "object": object.id().to_string(), "linked": linked })
        );
    } else {
        println!("{} ({} new tag(s))", object.id(), linked);
    }
    Ok(())
}

pub fn cmd_remove(
    database: &Path,
    json: bool,
    object: &str,
    tags: Option<&[String]>,
) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;
    let object = parse_item(object)?;

    let mut txn = store.begin_write()?;
    let removed = match tags {
        Some(tags) => txn.delete_tags(&object, &parse_items(tags)?)?,
        None => u32::from(txn.delete(&object)?),
    };
    txn.commit()?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "object": object.id().to_string(), "removed": removed })
        );
    } else if removed == 0 {
        println!("nothing to remove");
    } else {
        println!("removed {removed}");
    }
    Ok(())
}

pub fn cmd_tags(database: &Path, json: bool, object: &str) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;
    let object = parse_item(object)?;

    let txn = store.begin_read()?;
    let tags = txn.get_tags(&object)?;

    if json {
        let rows: Vec<serde_json::Value> = tags
            .iter()
            .map(|id| {
                let blob = txn.resolve(*id).ok().flatten();
                serde_json::json!({
                    "id": id.to_string(),
                    "blob": blob.as_deref().map(render_blob),
                })
            })
            .collect();
        println!("{}", serde_json::json!(rows));
    } else {
        for id in &tags {
            match txn.resolve(*id)? {
                Some(blob) => println!("{id}  {}", render_blob(&blob)),
                None => println!("{id}"),
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_search(
    database: &Path,
    json: bool,
    present: &[String],
    absent: &[String],
    limit: Option<usize>,
    after: Option<&str>,
    resolve: bool,
) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;

    let mut query = Query::all_of(parse_items(present)?).without(parse_items(absent)?);
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if let Some(after) = after {
        query = query.after(parse_id(after)?);
    }

    let txn = store.begin_read()?;
    let hits = txn.find(&query)?;
    info!(hits = hits.len(), "search finished");

    if json {
        let rows: Vec<serde_json::Value> = hits
            .iter()
            .map(|id| {
                let blob = if resolve {
                    txn.resolve(*id).ok().flatten()
                } else {
                    None
                };
                serde_json::json!({
                    "id": id.to_string(),
                    "blob": blob.as_deref().map(render_blob),
                })
            })
            .collect();
        println!("{}", serde_json::json!(rows));
    } else {
        for id in &hits {
            if resolve {
                match txn.resolve(*id)? {
                    Some(blob) => println!("{id}  {}", render_blob(&blob)),
                    None => println!("{id}"),
                }
            } else {
                println!("{id}");
            }
        }
    }
    Ok(())
}

pub fn cmd_resolve(database: &Path, json: bool, id: &str) -> Result<(), TagstoreError> {
    let store = TagStore::open(database)?;
    let id = parse_id(id)?;

    let blob = store.begin_read()?.resolve(id)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "id": id.to_string(), "blob": blob.as_deref().map(render_blob) })
        );
    } else {
        match blob {
            Some(blob) => println!("{}", render_blob(&blob)),
            None => println!("not found"),
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
