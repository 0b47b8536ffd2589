//! CLI entry point for kvfeed.
//!
//! This binary provides the `kvfeed` command for maintaining a JSON Feed
//! stored in a SQLite key-value database.

mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use kvfeed_core::{FeedAggregator, FeedOptions};
use kvfeed_store::{KvStore, SqliteKv};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::{DATABASE_ENV, FeedConfig};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "info" });

    let config = FeedConfig::load(&cli.config).with_overrides(
        std::env::var(DATABASE_ENV).ok(),
        cli.database.clone(),
        cli.prefix.as_deref(),
    );
    info!(
        database = %config.database.display(),
        prefix = %config.prefix,
        "configuration loaded"
    );

    let store = open_store(&config).await?;

    if let Commands::Purge = cli.command {
        commands::purge(&store).await?;
        store.close().await?;
        return Ok(());
    }

    let options = FeedOptions::default().with_list_batch_size(config.list_batch_size);
    let mut feed = FeedAggregator::create(store, config.prefix.clone(), config.feed_info(), options)
        .await
        .context("failed to load feed")?;

    let mut missing = false;
    let outcome = match cli.command {
        Commands::Add {
            file,
            group,
            expire_in,
            expire_at,
            approximate,
            new,
        } => {
            let args = commands::AddArgs {
                file,
                group,
                expire_in,
                expire_at,
                approximate,
                new,
            };
            commands::add(&mut feed, args).await
        }
        Commands::Get { id } => commands::get(&mut feed, &id),
        Commands::List { group } => commands::list(&mut feed, group.as_deref()),
        Commands::Has { id } => {
            missing = !commands::has(&mut feed, &id);
            Ok(())
        }
        Commands::Remove { id } => commands::remove(&mut feed, &id).await,
        Commands::RemoveAll { group } => commands::remove_all(&mut feed, group.as_deref()).await,
        Commands::Render { output } => commands::render(&mut feed, output.as_deref()),
        Commands::Purge => Ok(()),
    };

    // Release the database even when the command failed.
    feed.dispose().await?;
    outcome?;

    if missing {
        std::process::exit(1);
    }
    Ok(())
}

async fn open_store(config: &FeedConfig) -> Result<SqliteKv> {
    if let Some(dir) = config.database.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let store = SqliteKv::open(config.database.clone())
        .await
        .context("failed to open database")?;
    info!(path = %config.database.display(), "store initialized");
    Ok(store)
}

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber, honouring `RUST_LOG` when set.
///
/// Logs go to stderr so rendered feeds on stdout stay clean.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
