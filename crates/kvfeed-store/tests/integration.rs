//! Integration tests for the kvfeed-store crate.
//!
//! These tests exercise the store against a real SQLite database on disk
//! (via tempfile), including reopening the file from a fresh handle.

use std::time::Duration;

use kvfeed_store::{Database, Key, KvStore, Mutation, SqliteKv, StoreError};
use serde_json::json;

#[tokio::test]
async fn database_open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_idempotent.db");

    // Open and migrate twice -- should not fail.
    let db1 = Database::open_and_migrate(db_path.clone()).await.unwrap();
    db1.close().await.unwrap();

    let db2 = Database::open_and_migrate(db_path).await.unwrap();
    let count: i64 = db2
        .execute(|conn| {
            let c: i64 = conn.query_row("SELECT count(*) FROM kv_entries", [], |row| row.get(0))?;
            Ok(c)
        })
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persist.db");

    let kv = SqliteKv::open(db_path.clone()).await.unwrap();
    kv.atomic(vec![
        Mutation::set(Key::new(["feed", "1"]), json!({"id": "1"}), None),
        Mutation::set(
            Key::new(["feed", "sub", "2"]),
            json!({"id": "2"}),
            Some(Duration::from_secs(3600)),
        ),
    ])
    .await
    .unwrap();
    kv.close().await.unwrap();

    let reopened = SqliteKv::open(db_path).await.unwrap();
    let entries = reopened.list(&Key::new(["feed"]), 1000).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, Key::new(["feed", "1"]));
    assert_eq!(entries[0].expires_at, None);
    assert_eq!(entries[1].value, json!({"id": "2"}));
    assert!(entries[1].expires_at.is_some());
}

#[tokio::test]
async fn short_ttl_entry_disappears_after_deadline() {
    let kv = SqliteKv::open_in_memory().await.unwrap();
    kv.atomic(vec![Mutation::set(
        Key::new(["ttl", "1"]),
        json!(1),
        Some(Duration::from_millis(50)),
    )])
    .await
    .unwrap();

    assert!(kv.get(&Key::new(["ttl", "1"])).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert!(kv.get(&Key::new(["ttl", "1"])).await.unwrap().is_none());
    assert_eq!(kv.purge_expired().await.unwrap(), 1);
}

#[tokio::test]
async fn closed_store_rejects_calls() {
    let kv = SqliteKv::open_in_memory().await.unwrap();
    let db = kv.database().clone();
    db.close().await.unwrap();

    let err = kv.list(&Key::root(), 10).await.unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}
