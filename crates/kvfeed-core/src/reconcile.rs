//! Decides what each incoming item does to the feed.
//!
//! For every [`Candidate`] of one `add` call, [`plan`] produces a
//! [`Decision`] against the current cache, or fails the whole call:
//!
//! | Situation                                              | Outcome                      |
//! |--------------------------------------------------------|------------------------------|
//! | ID already seen earlier in the same call               | `DuplicateInBatch` error     |
//! | `expire_at <= now`                                     | [`Decision::Drop`]           |
//! | date approximation requested on a dated item           | `InvalidApproximation` error |
//! | ID unknown                                             | [`Decision::Insert`]         |
//! | ID known, overwrite forbidden                          | `AlreadyExists` error        |
//! | identical record                                       | [`Decision::Skip`]           |
//! | both approximated, same item apart from dates and same metadata | [`Decision::Skip`]  |
//! | both approximated, same item apart from dates, new metadata | [`Decision::Replace`], existing item kept |
//! | both approximated, item changed                        | [`Decision::Merge`]          |
//! | anything else                                          | [`Decision::Replace`]        |
//!
//! With approximation on both sides the stored dates were generated, not
//! supplied, so they are left out of the comparison. A merge keeps the
//! existing publish date and stamps the modify date with `now`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use kvfeed_store::Key;
use tracing::debug;

use crate::cache::ItemCache;
use crate::error::{FeedError, FeedResult};
use crate::record::{Candidate, Record};

/// Whether an add may overwrite items already in the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Reconcile against existing items (replace, merge or skip).
    Upsert,
    /// Reject any ID already in the feed.
    CreateOnly,
}

/// Outcome for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// New ID; store the record.
    Insert(Record),
    /// Known ID; overwrite with `record`, deleting `previous_key` if it moved.
    Replace { previous_key: Key, record: Record },
    /// Known ID, approximated dates carried over; overwrite like `Replace`.
    Merge { previous_key: Key, record: Record },
    /// Known ID, nothing to change.
    Skip { id: String },
    /// Already expired on arrival; discard.
    Drop { id: String },
}

impl Decision {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Replace { .. } => "replace",
            Self::Merge { .. } => "merge",
            Self::Skip { .. } => "skip",
            Self::Drop { .. } => "drop",
        }
    }

    /// The record to persist, if this decision writes one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            Self::Insert(record) | Self::Replace { record, .. } | Self::Merge { record, .. } => {
                Some(record)
            }
            Self::Skip { .. } | Self::Drop { .. } => None,
        }
    }

    /// The storage key the item occupied before this decision, if any.
    pub fn previous_key(&self) -> Option<&Key> {
        match self {
            Self::Replace { previous_key, .. } | Self::Merge { previous_key, .. } => {
                Some(previous_key)
            }
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Self::Insert(record) | Self::Replace { record, .. } | Self::Merge { record, .. } => {
                Some(record)
            }
            Self::Skip { .. } | Self::Drop { .. } => None,
        }
    }
}

/// Reconcile a whole batch. Any validation failure rejects the batch.
pub fn plan(
    candidates: Vec<Candidate>,
    cache: &ItemCache,
    now: DateTime<Utc>,
    mode: AddMode,
) -> FeedResult<Vec<Decision>> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut decisions = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let decision = reconcile(candidate, cache, now, mode, &mut seen)?;
        debug!(kind = decision.kind(), "reconciled item");
        decisions.push(decision);
    }

    Ok(decisions)
}

fn reconcile(
    candidate: Candidate,
    cache: &ItemCache,
    now: DateTime<Utc>,
    mode: AddMode,
    seen: &mut HashSet<String>,
) -> FeedResult<Decision> {
    let id = candidate.item.id.clone();

    if id.is_empty() {
        return Err(FeedError::InvalidItem {
            id,
            reason: "item ID must not be empty".into(),
        });
    }
    if let Some(key) = candidate.item.shadowed_extension() {
        return Err(FeedError::InvalidItem {
            reason: format!("extension key {key:?} shadows a JSON Feed field"),
            id,
        });
    }
    if !seen.insert(id.clone()) {
        return Err(FeedError::DuplicateInBatch { id });
    }

    let mut record = Record::from(candidate);

    if record.is_expired_at(now) {
        debug!(id = %id, "item expired before it was added, dropping");
        return Ok(Decision::Drop { id });
    }
    if record.approximate_date && record.item.is_dated() {
        return Err(FeedError::InvalidApproximation { id });
    }

    let Some(existing) = cache.get(&id) else {
        if record.approximate_date {
            record.item.date_published = Some(now);
        }
        return Ok(Decision::Insert(record));
    };

    if mode == AddMode::CreateOnly {
        return Err(FeedError::AlreadyExists { id });
    }

    let previous_key = cache.key_of(existing);

    if record == *existing {
        return Ok(Decision::Skip { id });
    }

    if record.approximate_date && existing.approximate_date {
        if record.item.eq_ignoring_dates(&existing.item) {
            if record.group_key == existing.group_key && record.expire_at == existing.expire_at {
                return Ok(Decision::Skip { id });
            }
            // Only the metadata changed; keep the stored item and its dates.
            record.item = existing.item.clone();
            return Ok(Decision::Replace {
                previous_key,
                record,
            });
        }

        record.item.date_published = existing.item.date_published;
        record.item.date_modified = Some(now);
        return Ok(Decision::Merge {
            previous_key,
            record,
        });
    }

    if record.approximate_date {
        record.item.date_published = Some(now);
    }
    Ok(Decision::Replace {
        previous_key,
        record,
    })
}

// ── tests ────────────────────────────────────────────────────────────
