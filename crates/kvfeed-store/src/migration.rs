//! Versioned schema migrations.
//!
//! Each migration is a static SQL script with a version number. Applied
//! versions are recorded in `_migrations`, so running the list again only
//! applies what is missing.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

struct Migration {
    /// Strictly increasing, starting at 1.
    version: u32,
    description: &'static str,
    /// One or more statements separated by `;`.
    sql: &'static str,
}

/// Append new migrations at the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "ordered key-value entries with optional expiry",
    sql: r#"
            CREATE TABLE kv_entries (
                key        BLOB PRIMARY KEY,
                value      TEXT NOT NULL,
                expires_at INTEGER
            ) WITHOUT ROWID;
            CREATE INDEX idx_kv_entries_expires ON kv_entries(expires_at)
                WHERE expires_at IS NOT NULL;
        "#,
}];

/// Version of the newest known migration.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring the schema of `conn` up to [`latest_version`].
///
/// Blocking; callers on the runtime go through `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(failed(0, "create _migrations"))?;

    let current = current_version(conn)?;
    let mut applied = 0usize;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "schema up to date");
    } else {
        info!(from = current, to = latest_version(), applied, "schema migrated");
    }
    Ok(())
}

/// Highest applied version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| {
        row.get(0)
    })
    .map_err(failed(0, "read current version"))
}

/// Run one migration and record it, atomically.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let version = migration.version;
    debug!(version, description = migration.description, "applying migration");

    // Dropping the transaction without commit rolls it back.
    let tx = conn
        .unchecked_transaction()
        .map_err(failed(version, "begin"))?;

    let outcome = tx
        .execute_batch(migration.sql)
        .map_err(failed(version, "execute"))
        .and_then(|()| {
            tx.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![version, migration.description, chrono::Utc::now().timestamp()],
            )
            .map_err(failed(version, "record"))
        });

    if let Err(err) = outcome {
        warn!(version, %err, "migration failed, rolling back");
        return Err(err);
    }
    tx.commit().map_err(failed(version, "commit"))
}

fn failed(version: u32, step: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |err| StoreError::Migration {
        version,
        message: format!("{step}: {err}"),
    }
}

// ── tests ────────────────────────────────────────────────────────────
