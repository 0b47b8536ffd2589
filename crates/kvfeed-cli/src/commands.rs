//! Subcommand handlers.
//!
//! Each handler runs against an already-created aggregator, except
//! [`purge`], which works on the raw store.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, Utc};
use kvfeed_core::{Candidate, FeedAggregator, Item};
use kvfeed_store::{KvStore, SqliteKv};
use serde::Deserialize;
use tracing::info;

use crate::config::parse_key;

/// Options for `kvfeed add`.
pub struct AddArgs {
    pub file: PathBuf,
    pub group: Option<String>,
    pub expire_in: Option<u64>,
    pub expire_at: Option<String>,
    pub approximate: bool,
    pub new: bool,
}

/// A JSON document holding one item or several.
#[derive(Deserialize)]
#[serde(untagged)]
enum ItemsDocument {
    Many(Vec<Item>),
    One(Box<Item>),
}

// ---------------------------------------------------------------------------
// Subcommand: add
// ---------------------------------------------------------------------------

pub async fn add(feed: &mut FeedAggregator<SqliteKv>, args: AddArgs) -> Result<()> {
    let items = read_items(&args.file)?;
    let expire_at = resolve_expiry(args.expire_in, args.expire_at.as_deref(), Utc::now())?;
    let group = args.group.as_deref().map(parse_key).unwrap_or_default();

    let candidates: Vec<Candidate> = items
        .into_iter()
        .map(|item| {
            let mut candidate = Candidate::new(item).in_group(group.clone());
            candidate.expire_at = expire_at;
            candidate.approximate_date = args.approximate;
            candidate
        })
        .collect();
    let count = candidates.len();

    if args.new {
        feed.add_new(candidates).await?;
    } else {
        feed.add(candidates).await?;
    }
    info!(count, "items submitted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only subcommands
// ---------------------------------------------------------------------------

pub fn get(feed: &mut FeedAggregator<SqliteKv>, id: &str) -> Result<()> {
    let Some(item) = feed.get(id) else {
        bail!("no item with id {id:?}");
    };
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub fn list(feed: &mut FeedAggregator<SqliteKv>, group: Option<&str>) -> Result<()> {
    let group = group.map(parse_key);
    let items = feed.get_all(group.as_ref());
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

/// Prints the answer and returns it so the caller can set the exit code.
pub fn has(feed: &mut FeedAggregator<SqliteKv>, id: &str) -> bool {
    let present = feed.has(id);
    println!("{present}");
    present
}

pub fn render(feed: &mut FeedAggregator<SqliteKv>, output: Option<&Path>) -> Result<()> {
    let document = feed.render()?;
    match output {
        Some(path) => {
            std::fs::write(path, document)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "feed written");
        }
        None => println!("{document}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

pub async fn remove(feed: &mut FeedAggregator<SqliteKv>, id: &str) -> Result<()> {
    if feed.remove(id).await? {
        println!("removed {id}");
    } else {
        println!("no item with id {id:?}");
    }
    Ok(())
}

pub async fn remove_all(feed: &mut FeedAggregator<SqliteKv>, group: Option<&str>) -> Result<()> {
    let group = group.map(parse_key);
    let removed = feed.remove_all(group.as_ref()).await?;
    println!("removed {removed} item(s)");
    Ok(())
}

/// Sweep expired entries from the whole database, not just the feed prefix.
pub async fn purge(store: &SqliteKv) -> Result<usize> {
    let purged = store.purge_expired().await?;
    info!(purged, "expired entries purged store-wide");
    println!(
        "purged {purged} expired entr{} (store-wide)",
        if purged == 1 { "y" } else { "ies" }
    );
    Ok(purged)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read items from `path`, or from stdin when `path` is `-`.
fn read_items(path: &Path) -> Result<Vec<Item>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read items from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    parse_items(&content)
}

fn parse_items(content: &str) -> Result<Vec<Item>> {
    let document: ItemsDocument =
        serde_json::from_str(content).context("items must be a JSON Feed item or an array of them")?;
    Ok(match document {
        ItemsDocument::Many(items) => items,
        ItemsDocument::One(item) => vec![*item],
    })
}

fn resolve_expiry(
    expire_in: Option<u64>,
    expire_at: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    if let Some(secs) = expire_in {
        let secs = i64::try_from(secs).context("--expire-in is too large")?;
        let at = Duration::try_seconds(secs)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .context("--expire-in is too large")?;
        return Ok(Some(at));
    }
    expire_at
        .map(|text| {
            DateTime::parse_from_rfc3339(text)
                .map(|at| at.with_timezone(&Utc))
                .with_context(|| format!("invalid --expire-at {text:?}, expected RFC 3339"))
        })
        .transpose()
}

// ── tests ────────────────────────────────────────────────────────────
