//! SQLite connection handle.
//!
//! [`Database`] keeps one `rusqlite::Connection` behind `Arc<Mutex<..>>` and
//! runs every call through `tokio::task::spawn_blocking`, so SQLite work never
//! blocks the runtime. Connections are opened in WAL mode.
//!
//! Clones share one connection. [`Database::close`] drops it for every
//! clone; calls made afterwards fail with [`StoreError::Closed`].

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Shared handle to one SQLite connection.
///
/// Every call hops onto the blocking pool; the connection slot is emptied by
/// [`Database::close`].
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl Database {
    /// Open (or create) the database file at `path`. Blocks on file I/O.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Private in-memory database; it disappears once the last clone closes.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// [`Database::open`] off the runtime, followed by [`Database::run_migrations`].
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// [`Database::open_in_memory`] followed by [`Database::run_migrations`].
    pub async fn open_in_memory_and_migrate() -> StoreResult<Self> {
        let db = Self::open_in_memory()?;
        db.run_migrations().await?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::apply_pragmas(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Apply any migrations the database has not seen yet.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(migration::run_all).await
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// ```ignore
    /// let rows: i64 = db
    ///     .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM kv_entries", [], |r| r.get(0))?))
    ///     .await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_slot(move |slot| f(slot.as_ref().ok_or(StoreError::Closed)?))
            .await
    }

    /// Like [`Database::execute`], with `&mut Connection` for transactions.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_slot(move |slot| f(slot.as_mut().ok_or(StoreError::Closed)?))
            .await
    }

    /// Close the connection shared by this handle and all its clones.
    ///
    /// A second close fails with [`StoreError::Closed`].
    pub async fn close(&self) -> StoreResult<()> {
        self.with_slot(|slot| {
            let conn = slot.take().ok_or(StoreError::Closed)?;
            conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
            info!("database closed");
            Ok(())
        })
        .await
    }

    /// Whether [`Database::close`] has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }

    /// Number of live clones sharing this connection.
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.conn)
    }

    async fn with_slot<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Option<Connection>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || f(&mut *lock(&conn)?)).await?
    }

    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        for (name, value) in PRAGMAS {
            conn.pragma_update(None, name, value)?;
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!("pragmas applied (WAL, synchronous NORMAL)");
        Ok(())
    }
}

/// WAL gives concurrent readers; with it, NORMAL sync can lose the last
/// commit on power failure but never corrupts.
const PRAGMAS: &[(&str, &str)] = &[
    ("journal_mode", "WAL"),
    ("synchronous", "NORMAL"),
    ("temp_store", "MEMORY"),
];

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn lock(conn: &Mutex<Option<Connection>>) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma(db: &Database, name: &'static str) -> impl Future<Output = StoreResult<String>> {
        db.execute(move |conn| Ok(conn.pragma_query_value(None, name, |row| row.get(0))?))
    }

    #[tokio::test]
    async fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("wal.db")).unwrap();

        assert_eq!(pragma(&db, "journal_mode").await.unwrap(), "wal");
    }

    #[tokio::test]
    async fn migrated_database_has_empty_kv_table() {
        let db = Database::open_in_memory_and_migrate().await.unwrap();

        let rows: i64 = db
            .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM kv_entries", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn calls_after_close_fail_fast() {
        let db = Database::open_in_memory().unwrap();
        let clone = db.clone();

        db.close().await.unwrap();
        assert!(clone.is_closed());

        let err = clone.execute(|_| Ok(())).await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));

        let err = db.close().await.unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }
}
