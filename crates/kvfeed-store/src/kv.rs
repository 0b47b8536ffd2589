//! Ordered key-value store with per-key expiry.
//!
//! [`KvStore`] is the interface the feed aggregator talks to: paged prefix
//! listing in key order, atomic multi-key set/delete with optional
//! time-to-live, and an explicit close. [`SqliteKv`] implements it on top of
//! the [`Database`] handle, storing keys as order-preserving blobs (see
//! [`Key::encode`]).
//!
//! Expired entries are hidden from reads as soon as their deadline passes.
//! Physical deletion happens in [`KvStore::purge_expired`] and piggybacks on
//! every [`KvStore::atomic`] commit.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::key::Key;

/// Largest page a single [`KvStore::list_page`] call may request.
pub const MAX_LIST_BATCH_SIZE: usize = 1000;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A single stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: Key,
    pub value: serde_json::Value,
    /// Deadline after which the store no longer returns the entry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Unconditional upsert, optionally expiring `expire_in` after commit.
    Set {
        key: Key,
        value: serde_json::Value,
        expire_in: Option<Duration>,
    },
    /// Delete the key if present.
    Delete { key: Key },
}

impl Mutation {
    pub fn set(key: Key, value: serde_json::Value, expire_in: Option<Duration>) -> Self {
        Self::Set {
            key,
            value,
            expire_in,
        }
    }

    pub fn delete(key: Key) -> Self {
        Self::Delete { key }
    }

    pub fn key(&self) -> &Key {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  KvStore
// ═══════════════════════════════════════════════════════════════════════

/// Ordered key-value store used as the feed aggregator's persistence.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Return up to `limit` live entries strictly under `prefix`, in key
    /// order, starting strictly after `after` when given.
    async fn list_page(
        &self,
        prefix: &Key,
        after: Option<&Key>,
        limit: usize,
    ) -> StoreResult<Vec<KvEntry>>;

    /// Return every live entry under `prefix` by draining pages of
    /// `batch_size`.
    ///
    /// Pages are separate reads: a concurrent writer may be visible in a
    /// later page but not an earlier one.
    async fn list(&self, prefix: &Key, batch_size: usize) -> StoreResult<Vec<KvEntry>> {
        let mut entries: Vec<KvEntry> = Vec::new();
        loop {
            let after = entries.last().map(|entry| entry.key.clone());
            let page = self.list_page(prefix, after.as_ref(), batch_size).await?;
            let exhausted = page.len() < batch_size;
            entries.extend(page);
            if exhausted {
                break;
            }
        }
        Ok(entries)
    }

    /// Fetch a single live entry.
    async fn get(&self, key: &Key) -> StoreResult<Option<KvEntry>>;

    /// Apply all mutations in one transaction, or none of them.
    async fn atomic(&self, mutations: Vec<Mutation>) -> StoreResult<()>;

    /// Physically delete expired entries, returning how many were removed.
    async fn purge_expired(&self) -> StoreResult<usize>;

    /// Release this handle.
    async fn close(self) -> StoreResult<()>
    where
        Self: Sized;
}

// ═══════════════════════════════════════════════════════════════════════
//  SqliteKv
// ═══════════════════════════════════════════════════════════════════════

/// [`KvStore`] backed by the `kv_entries` table.
///
/// Clones share the underlying connection. Closing a handle closes the
/// connection once no other handle refers to it.
#[derive(Clone)]
pub struct SqliteKv {
    db: Database,
}

/// A mutation with its value serialized and its deadline resolved.
enum PreparedWrite {
    Set {
        key: Vec<u8>,
        value: String,
        expires_at: Option<i64>,
    },
    Delete {
        key: Vec<u8>,
    },
}

impl SqliteKv {
    /// Wrap an already-migrated database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) a store file and run migrations.
    pub async fn open(path: impl AsRef<std::path::Path> + Send + 'static) -> StoreResult<Self> {
        Ok(Self::new(Database::open_and_migrate(path).await?))
    }

    /// Open a fresh in-memory store.
    pub async fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(Database::open_in_memory_and_migrate().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn prepare(mutations: Vec<Mutation>, now_ms: i64) -> StoreResult<Vec<PreparedWrite>> {
        let mut writes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let write = match mutation {
                Mutation::Set {
                    key,
                    value,
                    expire_in,
                } => {
                    let expires_at = match expire_in {
                        Some(ttl) => Some(
                            i64::try_from(ttl.as_millis())
                                .ok()
                                .and_then(|ms| now_ms.checked_add(ms))
                                .ok_or_else(|| {
                                    StoreError::InvalidArgument(format!(
                                        "expiry for key {key} is out of range"
                                    ))
                                })?,
                        ),
                        None => None,
                    };
                    PreparedWrite::Set {
                        key: key.encode(),
                        value: serde_json::to_string(&value)?,
                        expires_at,
                    }
                }
                Mutation::Delete { key } => PreparedWrite::Delete { key: key.encode() },
            };
            writes.push(write);
        }
        Ok(writes)
    }
}

fn check_limit(limit: usize) -> StoreResult<()> {
    if limit == 0 || limit > MAX_LIST_BATCH_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "list batch size must be between 1 and {MAX_LIST_BATCH_SIZE}, got {limit}"
        )));
    }
    Ok(())
}

fn row_to_entry(key: Vec<u8>, value: String, expires_at: Option<i64>) -> StoreResult<KvEntry> {
    Ok(KvEntry {
        key: Key::decode(&key)?,
        value: serde_json::from_str(&value)?,
        expires_at: expires_at.and_then(DateTime::from_timestamp_millis),
    })
}

#[async_trait]
impl KvStore for SqliteKv {
    #[instrument(skip(self, prefix, after), fields(prefix = %prefix))]
    async fn list_page(
        &self,
        prefix: &Key,
        after: Option<&Key>,
        limit: usize,
    ) -> StoreResult<Vec<KvEntry>> {
        check_limit(limit)?;

        let (lower, upper) = prefix.prefix_range();
        let lower = after
            .map(Key::encode)
            .filter(|cursor| *cursor > lower)
            .unwrap_or(lower);
        let now_ms = Utc::now().timestamp_millis();
        // Bounded by MAX_LIST_BATCH_SIZE above.
        let limit = limit as i64;

        let entries = self
            .db
            .execute(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT key, value, expires_at FROM kv_entries \
                     WHERE key > ?1 AND key < ?2 \
                       AND (expires_at IS NULL OR expires_at > ?3) \
                     ORDER BY key LIMIT ?4",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![lower, upper, now_ms, limit], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?
                    .collect::<Result<Vec<(Vec<u8>, String, Option<i64>)>, _>>()?;
                rows.into_iter()
                    .map(|(key, value, expires_at)| row_to_entry(key, value, expires_at))
                    .collect::<StoreResult<Vec<_>>>()
            })
            .await?;

        debug!(count = entries.len(), "listed page");
        Ok(entries)
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn get(&self, key: &Key) -> StoreResult<Option<KvEntry>> {
        let encoded = key.encode();
        let now_ms = Utc::now().timestamp_millis();

        self.db
            .execute(move |conn| {
                let row: Option<(Vec<u8>, String, Option<i64>)> = conn
                    .query_row(
                        "SELECT key, value, expires_at FROM kv_entries \
                         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                        rusqlite::params![encoded, now_ms],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .optional()?;
                row.map(|(key, value, expires_at)| row_to_entry(key, value, expires_at))
                    .transpose()
            })
            .await
    }

    #[instrument(skip(self, mutations), fields(count = mutations.len()))]
    async fn atomic(&self, mutations: Vec<Mutation>) -> StoreResult<()> {
        if mutations.is_empty() {
            return Ok(());
        }

        let now_ms = Utc::now().timestamp_millis();
        let writes = Self::prepare(mutations, now_ms)?;

        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut set = tx.prepare_cached(
                        "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3) \
                         ON CONFLICT(key) DO UPDATE SET \
                           value = excluded.value, expires_at = excluded.expires_at",
                    )?;
                    let mut delete = tx.prepare_cached("DELETE FROM kv_entries WHERE key = ?1")?;

                    for write in &writes {
                        match write {
                            PreparedWrite::Set {
                                key,
                                value,
                                expires_at,
                            } => {
                                set.execute(rusqlite::params![key, value, expires_at])?;
                            }
                            PreparedWrite::Delete { key } => {
                                delete.execute(rusqlite::params![key])?;
                            }
                        }
                    }
                }
                let swept = tx.execute(
                    "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    rusqlite::params![now_ms],
                )?;
                tx.commit()?;
                debug!(writes = writes.len(), swept, "atomic batch committed");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self) -> StoreResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let purged = self
            .db
            .execute(move |conn| {
                let n = conn.execute(
                    "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    rusqlite::params![now_ms],
                )?;
                Ok(n)
            })
            .await?;
        if purged > 0 {
            info!(purged, "expired entries purged");
        }
        Ok(purged)
    }

    async fn close(self) -> StoreResult<()> {
        if self.db.handle_count() > 1 {
            debug!("store handle released, connection still shared");
            return Ok(());
        }
        self.db.close().await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key(segments: &[&str]) -> Key {
        Key::from(segments)
    }

    async fn store_with(entries: &[(&[&str], serde_json::Value)]) -> SqliteKv {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        let mutations = entries
            .iter()
            .map(|(k, v)| Mutation::set(key(k), v.clone(), None))
            .collect();
        kv.atomic(mutations).await.unwrap();
        kv
    }

    #[tokio::test]
    async fn set_and_get() {
        let kv = store_with(&[(&["feed", "1"], json!({"id": "1"}))]).await;

        let entry = kv.get(&key(&["feed", "1"])).await.unwrap().unwrap();
        assert_eq!(entry.value, json!({"id": "1"}));
        assert_eq!(entry.expires_at, None);
        assert!(kv.get(&key(&["feed", "2"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let kv = store_with(&[(&["k"], json!("old"))]).await;
        kv.atomic(vec![Mutation::set(key(&["k"]), json!("new"), None)])
            .await
            .unwrap();

        let entry = kv.get(&key(&["k"])).await.unwrap().unwrap();
        assert_eq!(entry.value, json!("new"));
    }

    #[tokio::test]
    async fn list_is_key_ordered_and_prefix_scoped() {
        let kv = store_with(&[
            (&["feed", "3"], json!(3)),
            (&["feed", "my", "sub", "1"], json!(1)),
            (&["feed", "2"], json!(2)),
            (&["feed"], json!("self")),
            (&["feed2", "1"], json!("other")),
            (&["fee", "1"], json!("other")),
        ])
        .await;

        let entries = kv.list(&key(&["feed"]), 10).await.unwrap();
        let keys: Vec<Key> = entries.into_iter().map(|e| e.key).collect();
        assert_eq!(
            keys,
            vec![
                key(&["feed", "2"]),
                key(&["feed", "3"]),
                key(&["feed", "my", "sub", "1"]),
            ]
        );
    }

    #[tokio::test]
    async fn list_drains_multiple_pages() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        let mutations = (0..25)
            .map(|i| Mutation::set(key(&["p", &format!("{i:03}")]), json!(i), None))
            .collect();
        kv.atomic(mutations).await.unwrap();

        let first = kv.list_page(&key(&["p"]), None, 10).await.unwrap();
        assert_eq!(first.len(), 10);
        let second = kv
            .list_page(&key(&["p"]), Some(&first[9].key), 10)
            .await
            .unwrap();
        assert_eq!(second[0].key, key(&["p", "010"]));

        let all = kv.list(&key(&["p"]), 10).await.unwrap();
        assert_eq!(all.len(), 25);
        assert_eq!(all[24].value, json!(24));
    }

    #[tokio::test]
    async fn list_rejects_bad_batch_size() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        for size in [0, MAX_LIST_BATCH_SIZE + 1] {
            let err = kv.list(&Key::root(), size).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)));
        }
    }

    #[tokio::test]
    async fn expired_entries_are_hidden_and_purged() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        kv.atomic(vec![
            Mutation::set(key(&["t", "gone"]), json!(1), Some(Duration::ZERO)),
            Mutation::set(key(&["t", "kept"]), json!(2), Some(Duration::from_secs(3600))),
        ])
        .await
        .unwrap();

        assert!(kv.get(&key(&["t", "gone"])).await.unwrap().is_none());
        let kept = kv.get(&key(&["t", "kept"])).await.unwrap().unwrap();
        assert!(kept.expires_at.unwrap() > Utc::now());

        let listed = kv.list(&key(&["t"]), 10).await.unwrap();
        assert_eq!(listed.len(), 1);

        // The commit above already swept the zero-TTL row.
        assert_eq!(kv.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn atomic_is_all_or_nothing() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        kv.database()
            .execute(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_boom BEFORE INSERT ON kv_entries \
                     WHEN NEW.value = '\"boom\"' \
                     BEGIN SELECT RAISE(ABORT, 'boom rejected'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let result = kv
            .atomic(vec![
                Mutation::set(key(&["a"]), json!("fine"), None),
                Mutation::set(key(&["b"]), json!("boom"), None),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert!(kv.get(&key(&["a"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let kv = store_with(&[(&["a"], json!(1)), (&["b"], json!(2))]).await;
        kv.atomic(vec![Mutation::delete(key(&["a"])), Mutation::delete(key(&["zzz"]))])
            .await
            .unwrap();

        assert!(kv.get(&key(&["a"])).await.unwrap().is_none());
        assert!(kv.get(&key(&["b"])).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn close_waits_for_last_handle() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        let other = kv.clone();

        kv.close().await.unwrap();
        assert!(!other.database().is_closed());
        assert!(other.get(&key(&["x"])).await.unwrap().is_none());

        let db = other.database().clone();
        other.close().await.unwrap();
        // `db` still pointed at the connection, so it stays open.
        assert!(!db.is_closed());
    }

    #[tokio::test]
    async fn closed_database_fails_fast() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        kv.database().close().await.unwrap();

        let err = kv.get(&key(&["x"])).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }
}
