//! Items as they are added ([`Candidate`]) and as they are stored ([`Record`]).
//!
//! A record is stored under `prefix ++ group_key ++ [item.id]`. The whole
//! record, metadata included, is the stored value, so a fresh aggregator can
//! rebuild its cache from the store alone.

use chrono::{DateTime, Utc};
use kvfeed_store::Key;
use serde::{Deserialize, Serialize};

use crate::feed::Item;

/// An item offered to [`crate::FeedAggregator::add`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub item: Item,
    /// Extra key segments between the feed prefix and the item ID.
    pub group_key: Key,
    /// Instant after which the item no longer belongs to the feed.
    pub expire_at: Option<DateTime<Utc>>,
    /// Stamp the publish date with the time of the add.
    pub approximate_date: bool,
}

impl Candidate {
    pub fn new(item: Item) -> Self {
        Self {
            item,
            group_key: Key::root(),
            expire_at: None,
            approximate_date: false,
        }
    }

    pub fn in_group(mut self, group_key: Key) -> Self {
        self.group_key = group_key;
        self
    }

    pub fn expire_at(mut self, at: DateTime<Utc>) -> Self {
        self.expire_at = Some(at);
        self
    }

    pub fn approximate_date(mut self) -> Self {
        self.approximate_date = true;
        self
    }
}

impl From<Item> for Candidate {
    fn from(item: Item) -> Self {
        Self::new(item)
    }
}

/// The durable unit: an item plus its storage metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub item: Item,
    #[serde(default, skip_serializing_if = "Key::is_empty")]
    pub group_key: Key,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub approximate_date: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Record {
    pub fn id(&self) -> &str {
        &self.item.id
    }

    /// Full storage key under the feed `prefix`.
    pub fn storage_key(&self, prefix: &Key) -> Key {
        prefix.join(&self.group_key).child(self.item.id.as_str())
    }

    /// Whether the record's expiry is at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }

    /// Time left until expiry, measured from `now`.
    ///
    /// Records that are already expired report zero.
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.expire_at
            .map(|at| (at - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }
}

impl From<Candidate> for Record {
    fn from(candidate: Candidate) -> Self {
        Self {
            item: candidate.item,
            group_key: candidate.group_key,
            expire_at: candidate.expire_at,
            approximate_date: candidate.approximate_date,
        }
    }
}
