//! # kvfeed-store
//!
//! Ordered key-value storage for kvfeed.
//!
//! Provides a SQLite-backed store (WAL mode) whose keys are lists of string
//! segments kept in segment order, with per-key time-to-live, atomic
//! multi-key batches and paged prefix listing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  KvStore trait (list / atomic / close)  │
//! ├─────────────────────────────────────────┤
//! │  SqliteKv  (kv_entries, blob keys, TTL) │
//! │  Key       (order-preserving encoding)  │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL)                │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use kvfeed_store::{Key, KvStore, Mutation, SqliteKv};
//!
//! let kv = SqliteKv::open("data/feed.db").await?;
//! kv.atomic(vec![Mutation::set(Key::new(["feed", "1"]), value, None)]).await?;
//! let entries = kv.list(&Key::new(["feed"]), 1000).await?;
//! ```

pub mod db;
pub mod error;
pub mod key;
pub mod kv;
pub mod migration;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use key::Key;
pub use kv::{KvEntry, KvStore, MAX_LIST_BATCH_SIZE, Mutation, SqliteKv};
