//! # tagstore
//!
//! Command-line interface for the tagstore persistent tag index.
//!
//! ```bash
//! tagstore -D index.redb add report.pdf -t pdf,2026
//! tagstore -D index.redb search -p pdf -a archived --resolve
//! tagstore -D index.redb status --json
//! ```
//!
//! Objects and tags are passed as UTF-8 strings; an argument of the form
//! `id:<32 hex chars>` is treated as a pre-resolved identifier instead.

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "tagstore=debug"
    } else {
        "tagstore=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = cli::execute(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
