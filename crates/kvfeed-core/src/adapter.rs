//! Translation between the cache and the key-value store.
//!
//! [`load`] seeds a cache from every entry under the feed prefix.
//! [`write_mutations`] and [`delete_mutations`] turn cache changes into one
//! atomic store batch each. The aggregator applies a change to its cache
//! only after that batch commits.

use chrono::{DateTime, Utc};
use kvfeed_store::{Key, KvStore, Mutation};
use tracing::{debug, info, warn};

use crate::cache::ItemCache;
use crate::error::FeedResult;
use crate::reconcile::Decision;
use crate::record::Record;

/// Read all records under `prefix` into a fresh cache.
///
/// The store pages through the prefix without a snapshot, so records
/// written by another instance while loading may or may not be seen.
/// Entries that do not decode as a record, or sit under a key that does not
/// match their own contents, are skipped with a warning. If an ID turns up
/// under several keys, the last one in key order wins and the others are
/// deleted in one batch.
pub async fn load<S: KvStore>(store: &S, prefix: &Key, batch_size: usize) -> FeedResult<ItemCache> {
    let entries = store.list(prefix, batch_size).await?;
    let total = entries.len();
    let mut cache = ItemCache::new(prefix.clone());
    let mut stale_keys = Vec::new();

    for entry in entries {
        let record: Record = match serde_json::from_value(entry.value) {
            Ok(record) => record,
            Err(err) => {
                warn!(key = %entry.key, %err, "stored value is not a feed record, skipping");
                continue;
            }
        };

        let expected = cache.key_of(&record);
        if expected != entry.key {
            warn!(
                key = %entry.key,
                expected = %expected,
                "stored record does not match its key, skipping"
            );
            continue;
        }

        if let Some(previous) = cache.upsert(record) {
            let stale = cache.key_of(&previous);
            warn!(id = previous.id(), stale = %stale, "item stored under more than one key, keeping the later one");
            stale_keys.push(stale);
        }
    }

    if !stale_keys.is_empty() {
        let removed = stale_keys.len();
        store
            .atomic(stale_keys.into_iter().map(Mutation::delete).collect())
            .await?;
        info!(removed, "stale duplicate keys deleted");
    }

    info!(prefix = %prefix, loaded = cache.len(), skipped = total - cache.len(), "feed cache loaded");
    Ok(cache)
}

/// Build the atomic batch persisting `decisions`.
///
/// Each written record gets a time-to-live of `expire_at - now`. A record
/// whose group key changed also deletes its previous key.
pub fn write_mutations(
    decisions: &[Decision],
    prefix: &Key,
    now: DateTime<Utc>,
) -> FeedResult<Vec<Mutation>> {
    let mut mutations = Vec::new();

    for decision in decisions {
        let Some(record) = decision.record() else {
            continue;
        };
        let key = record.storage_key(prefix);

        if let Some(previous_key) = decision.previous_key() {
            if *previous_key != key {
                debug!(from = %previous_key, to = %key, "item moved to a new key");
                mutations.push(Mutation::delete(previous_key.clone()));
            }
        }

        let value = serde_json::to_value(record)?;
        mutations.push(Mutation::set(key, value, record.time_to_live(now)));
    }

    Ok(mutations)
}

/// Build the atomic batch deleting `records`.
pub fn delete_mutations<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    prefix: &Key,
) -> Vec<Mutation> {
    records
        .into_iter()
        .map(|record| Mutation::delete(record.storage_key(prefix)))
        .collect()
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, TimeZone};
    use kvfeed_store::SqliteKv;
    use serde_json::json;

    use super::*;
    use crate::feed::Item;
    use crate::record::Candidate;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn prefix() -> Key {
        Key::new(["my", "example", "feed"])
    }

    fn record(id: &str) -> Record {
        Record::from(Candidate::new(Item::new(id).content_text(id)))
    }

    #[test]
    fn write_mutations_sets_ttl_and_skips_no_ops() {
        let expiring = Record::from(
            Candidate::new(Item::new("2").content_text("2")).expire_at(t0() + Duration::seconds(5)),
        );
        let decisions = vec![
            Decision::Insert(record("1")),
            Decision::Insert(expiring.clone()),
            Decision::Skip { id: "3".into() },
            Decision::Drop { id: "4".into() },
        ];

        let mutations = write_mutations(&decisions, &prefix(), t0()).unwrap();

        assert_eq!(
            mutations,
            vec![
                Mutation::set(
                    prefix().child("1"),
                    serde_json::to_value(record("1")).unwrap(),
                    None
                ),
                Mutation::set(
                    prefix().child("2"),
                    serde_json::to_value(&expiring).unwrap(),
                    Some(StdDuration::from_secs(5))
                ),
            ]
        );
    }

    #[test]
    fn moved_record_deletes_previous_key() {
        let moved = Record::from(
            Candidate::new(Item::new("1").content_text("1")).in_group(Key::new(["archive"])),
        );
        let decisions = vec![
            Decision::Replace {
                previous_key: prefix().child("1"),
                record: moved,
            },
            Decision::Replace {
                previous_key: prefix().child("2"),
                record: record("2"),
            },
        ];

        let mutations = write_mutations(&decisions, &prefix(), t0()).unwrap();
        let kinds: Vec<(bool, String)> = mutations
            .iter()
            .map(|m| (matches!(m, Mutation::Delete { .. }), m.key().to_string()))
            .collect();

        assert_eq!(
            kinds,
            vec![
                (true, "my/example/feed/1".to_string()),
                (false, "my/example/feed/archive/1".to_string()),
                (false, "my/example/feed/2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn load_reads_records_and_skips_garbage() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        let good = record("1");
        kv.atomic(vec![
            Mutation::set(prefix().child("1"), serde_json::to_value(&good).unwrap(), None),
            Mutation::set(prefix().child("junk"), json!({"not": "a record"}), None),
            // Value says id "3" but the key says "wrong".
            Mutation::set(
                prefix().child("wrong"),
                serde_json::to_value(record("3")).unwrap(),
                None,
            ),
            Mutation::set(
                Key::new(["other", "feed", "9"]),
                serde_json::to_value(record("9")).unwrap(),
                None,
            ),
        ])
        .await
        .unwrap();

        let cache = load(&kv, &prefix(), 2).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("1"), Some(&good));
    }

    #[test]
    fn delete_mutations_target_storage_keys() {
        let grouped = Record::from(
            Candidate::new(Item::new("2").content_text("2")).in_group(Key::new(["g"])),
        );
        let mutations = delete_mutations([&record("1"), &grouped], &prefix());

        assert_eq!(
            mutations,
            vec![
                Mutation::delete(prefix().child("1")),
                Mutation::delete(Key::new(["my", "example", "feed", "g", "2"])),
            ]
        );
    }

    #[tokio::test]
    async fn load_deletes_duplicate_keys_for_one_id() {
        let kv = SqliteKv::open_in_memory().await.unwrap();
        let ungrouped = record("1");
        let grouped = Record::from(
            Candidate::new(Item::new("1").content_text("moved")).in_group(Key::new(["g"])),
        );
        kv.atomic(vec![
            Mutation::set(prefix().child("1"), serde_json::to_value(&ungrouped).unwrap(), None),
            Mutation::set(
                prefix().child("g").child("1"),
                serde_json::to_value(&grouped).unwrap(),
                None,
            ),
        ])
        .await
        .unwrap();

        let cache = load(&kv, &prefix(), 10).await.unwrap();
        assert_eq!(cache.get("1"), Some(&grouped));

        let keys: Vec<Key> = kv
            .list(&prefix(), 10)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec![prefix().child("g").child("1")]);

        // Removing the survivor leaves nothing to resurrect.
        kv.atomic(delete_mutations([&grouped], &prefix())).await.unwrap();
        assert!(load(&kv, &prefix(), 10).await.unwrap().is_empty());
    }
}
