//! # CLI Module
//!
//! Argument structure and command dispatch.
//!
//! ## Available Commands
//!
//! - `init` - Create a new index file
//! - `status` - Show index sizes
//! - `add` - Tag an object
//! - `remove` - Remove an object, or specific tags from it
//! - `tags` - List the tags an object bears
//! - `search` - Conjunctive tag search
//! - `resolve` - Look up the original blob for an identifier

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tagstore_core::TagstoreError;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// tagstore - persistent tag index
///
/// Stores byte-blob objects under byte-blob tags and answers queries of
/// the form "every tag in P, none of the tags in N".
#[derive(Parser, Debug)]
#[command(name = "tagstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the index database
    #[arg(short = 'D', long, global = true, default_value = "tagstore.redb")]
    pub database: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new index file
    Init {
        /// Recreate the index even if the file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show index sizes
    Status,

    /// Tag an object
    Add {
        /// The object (UTF-8 string, or `id:<hex>`)
        object: String,

        /// Tags to attach (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        tags: Vec<String>,
    },

    /// Remove an object, or specific tags from it
    Remove {
        /// The object (UTF-8 string, or `id:<hex>`)
        object: String,

        /// Only detach these tags (comma-separated); without this flag
        /// the whole object is removed
        #[arg(short, long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// List the tags an object bears
    Tags {
        /// The object (UTF-8 string, or `id:<hex>`)
        object: String,
    },

    /// Conjunctive tag search
    Search {
        /// Tags every result must bear (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        present: Vec<String>,

        /// Tags no result may bear (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        absent: Vec<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Resume strictly after this object id (hex)
        #[arg(long)]
        after: Option<String>,

        /// Also print the original blob for each hit
        #[arg(short, long)]
        resolve: bool,
    },

    /// Look up the original blob for an identifier
    Resolve {
        /// The identifier (32 hex chars)
        id: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TagstoreError> {
    let json = cli.json;
    match cli.command {
        Some(Commands::Init { force }) => commands::cmd_init(&cli.database, force),
        Some(Commands::Status) | None => commands::cmd_status(&cli.database, json),
        Some(Commands::Add { object, tags }) => {
            commands::cmd_add(&cli.database, json, &object, &tags)
        }
        Some(Commands::Remove { object, tags }) => {
            commands::cmd_remove(&cli.database, json, &object, tags.as_deref())
        }
        Some(Commands::Tags { object }) => commands::cmd_tags(&cli.database, json, &object),
        Some(Commands::Search {
            present,
            absent,
            limit,
            after,
            resolve,
        }) => commands::cmd_search(
            &cli.database,
            json,
            &present,
            &absent,
            limit,
            after.as_deref(),
            resolve,
        ),
        Some(Commands::Resolve { id }) => commands::cmd_resolve(&cli.database, json, &id),
    }
}
