//! CLI argument definitions for kvfeed.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// kvfeed -- a de-duplicating, expiring JSON Feed over SQLite.
#[derive(Parser)]
#[command(
    name = "kvfeed",
    version,
    about = "kvfeed -- de-duplicating, expiring JSON Feed aggregator",
    long_about = "Maintains a JSON Feed in a SQLite key-value store. Items are \
                  de-duplicated by ID, may expire, and can be grouped under \
                  sub-keys of the feed prefix."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Database file (overrides config and KVFEED_DATABASE).
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Feed prefix as `/`-separated segments (overrides config).
    #[arg(long, global = true)]
    pub prefix: Option<String>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add items from a JSON file (one item or an array); `-` reads stdin.
    Add {
        /// File holding the items.
        file: PathBuf,

        /// Group the items under this `/`-separated sub-key.
        #[arg(long, short)]
        group: Option<String>,

        /// Expire the items this many seconds from now.
        #[arg(long, conflicts_with = "expire_at")]
        expire_in: Option<u64>,

        /// Expire the items at this RFC 3339 instant.
        #[arg(long)]
        expire_at: Option<String>,

        /// Stamp undated items with the current time as their publish date.
        #[arg(long)]
        approximate: bool,

        /// Fail instead of replacing items that already exist.
        #[arg(long)]
        new: bool,
    },

    /// Print one item as JSON.
    Get {
        /// The item ID.
        id: String,
    },

    /// Print all items as a JSON array.
    List {
        /// Only items in this `/`-separated group.
        #[arg(long, short)]
        group: Option<String>,
    },

    /// Print whether an item exists; exits non-zero if it does not.
    Has {
        /// The item ID.
        id: String,
    },

    /// Remove one item.
    Remove {
        /// The item ID.
        id: String,
    },

    /// Remove every item, or every item in a group.
    RemoveAll {
        /// Only items in this `/`-separated group.
        #[arg(long, short)]
        group: Option<String>,
    },

    /// Render the feed document.
    Render {
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Physically delete expired entries from the database.
    Purge,
}
