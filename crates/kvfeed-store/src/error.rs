//! Failures of the key-value store.
//!
//! Callers mostly care about two groups: [`StoreError::Closed`] and
//! [`StoreError::InvalidArgument`] are misuse and will fail again if
//! retried; the rest come from SQLite, the data on disk, or the blocking
//! pool.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite rejected a statement, or the transaction of an `atomic`
    /// batch failed and was rolled back.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A value could not be encoded for storage, or a stored value is not
    /// valid JSON.
    #[error("stored value is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Creating or upgrading the `kv_entries` schema failed at `version`.
    #[error("schema migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// A key blob in `kv_entries` does not follow the segment encoding.
    #[error("invalid key encoding: {0}")]
    InvalidKey(String),

    /// Page size out of range, or a time-to-live that overflows the clock.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The blocking task running a SQLite call panicked or was cancelled,
    /// or a previous panic poisoned the connection lock.
    #[error("sqlite worker failed: {0}")]
    TaskJoin(String),

    /// The connection was closed by [`Database::close`](crate::Database::close)
    /// on this handle or a clone.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Whether the call was rejected because of how it was made, so retrying
    /// it unchanged cannot succeed.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::Closed | Self::InvalidArgument(_))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

// ── tests ────────────────────────────────────────────────────────────
