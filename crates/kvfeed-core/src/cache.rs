//! In-memory index of the feed's records.
//!
//! Records are held in a `BTreeMap` ordered by storage key, which is also
//! the order the store iterates in, with a side index from item ID to key.
//! Iteration, and therefore rendering, follows storage-key order; insertion
//! order carries no meaning.
//!
//! The cache never reads the clock. Callers pass the instant captured at the
//! start of their operation to [`ItemCache::clean`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use kvfeed_store::Key;
use tracing::debug;

use crate::record::Record;

/// Process-local view of all non-expired records, keyed by item ID.
#[derive(Debug, Clone)]
pub struct ItemCache {
    prefix: Key,
    by_key: BTreeMap<Key, Record>,
    keys: HashMap<String, Key>,
}

impl ItemCache {
    pub fn new(prefix: Key) -> Self {
        Self {
            prefix,
            by_key: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    pub fn prefix(&self) -> &Key {
        &self.prefix
    }

    /// Storage key the record lives (or would live) under.
    pub fn key_of(&self, record: &Record) -> Key {
        record.storage_key(&self.prefix)
    }

    /// Current storage key of the item with `id`.
    pub fn key_for_id(&self, id: &str) -> Option<&Key> {
        self.keys.get(id)
    }

    /// Remove every record whose expiry is at or before `now`.
    ///
    /// Returns how many records were removed.
    pub fn clean(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<Key> = self
            .by_key
            .iter()
            .filter(|(_, record)| record.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(record) = self.by_key.remove(key) {
                self.keys.remove(record.id());
            }
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "expired records dropped from cache");
        }
        expired.len()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.keys.get(id).and_then(|key| self.by_key.get(key))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.contains_key(id)
    }

    /// All records in storage-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.by_key.values()
    }

    /// Records whose group key equals `group_key` exactly, in storage-key
    /// order. `None` selects every record.
    pub fn select<'a>(&'a self, group_key: Option<&'a Key>) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_key
            .values()
            .filter(move |record| group_key.is_none_or(|group| record.group_key == *group))
    }

    /// Insert or replace the record for its ID, returning the previous one.
    ///
    /// If the group key changed, the old storage key is dropped.
    pub fn upsert(&mut self, record: Record) -> Option<Record> {
        let key = self.key_of(&record);
        let previous = self
            .keys
            .insert(record.id().to_owned(), key.clone())
            .and_then(|old_key| self.by_key.remove(&old_key));
        self.by_key.insert(key, record);
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<Record> {
        let key = self.keys.remove(id)?;
        self.by_key.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

// ── tests ────────────────────────────────────────────────────────────
