//! The feed aggregator: a de-duplicating, expiring item collection backed by
//! a [`KvStore`] and rendered as a JSON Feed.
//!
//! [`FeedAggregator::create`] is the only constructor. It loads every record
//! under the prefix before returning, so no handle exists without a loaded
//! cache. [`FeedAggregator::dispose`] consumes the handle, so nothing can be
//! called on it afterwards.
//!
//! Every operation reads the clock once, drops expired records from the
//! cache, and then does its work. Mutations write to the store first and
//! touch the cache only once the write has committed. A failed write leaves
//! the cache as it was.
//!
//! Operations take `&mut self`: one instance serves one caller at a time.
//! Several instances may share a store, but they do not see each other's
//! writes until reloaded, and the last write wins.

use std::sync::Arc;

use kvfeed_store::{Key, KvStore, MAX_LIST_BATCH_SIZE};
use tracing::{debug, info, instrument};

use crate::adapter;
use crate::cache::ItemCache;
use crate::clock::{Clock, SystemClock};
use crate::error::FeedResult;
use crate::feed::{Feed, FeedInfo, Item};
use crate::reconcile::{self, AddMode};
use crate::record::Candidate;

/// Construction options for [`FeedAggregator::create`].
#[derive(Debug, Clone)]
pub struct FeedOptions {
    clock: Arc<dyn Clock>,
    list_batch_size: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            list_batch_size: MAX_LIST_BATCH_SIZE,
        }
    }
}

impl FeedOptions {
    /// Use `clock` as the source of "now" for every operation.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Page size for the initial load, clamped to `1..=MAX_LIST_BATCH_SIZE`.
    pub fn with_list_batch_size(mut self, size: usize) -> Self {
        self.list_batch_size = size.clamp(1, MAX_LIST_BATCH_SIZE);
        self
    }

    pub fn list_batch_size(&self) -> usize {
        self.list_batch_size
    }
}

/// JSON Feed aggregator over a key-value store.
pub struct FeedAggregator<S: KvStore> {
    store: S,
    info: FeedInfo,
    clock: Arc<dyn Clock>,
    cache: ItemCache,
}

impl<S: KvStore> std::fmt::Debug for FeedAggregator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedAggregator")
            .field("prefix", self.cache.prefix())
            .field("title", &self.info.title)
            .field("records", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl<S: KvStore> FeedAggregator<S> {
    /// Load the feed stored under `prefix` and return a ready aggregator.
    #[instrument(skip(store, prefix, info, options), fields(prefix = %prefix))]
    pub async fn create(
        store: S,
        prefix: Key,
        info: FeedInfo,
        options: FeedOptions,
    ) -> FeedResult<Self> {
        let cache = adapter::load(&store, &prefix, options.list_batch_size).await?;
        let mut aggregator = Self {
            store,
            info,
            clock: options.clock,
            cache,
        };
        let now = aggregator.clock.now();
        aggregator.cache.clean(now);
        info!(records = aggregator.cache.len(), "feed aggregator ready");
        Ok(aggregator)
    }

    /// Add items, replacing or merging with items already in the feed.
    ///
    /// Fails the whole call, writing nothing, if an ID repeats within
    /// `items` or date approximation is requested for a dated item. Items
    /// that are already expired are silently dropped.
    pub async fn add<I>(&mut self, items: I) -> FeedResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Candidate>,
    {
        self.add_with_mode(items, AddMode::Upsert).await
    }

    /// Like [`add`](Self::add), but fails with `AlreadyExists` if any ID is
    /// already in the feed.
    pub async fn add_new<I>(&mut self, items: I) -> FeedResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Candidate>,
    {
        self.add_with_mode(items, AddMode::CreateOnly).await
    }

    #[instrument(skip(self, items))]
    async fn add_with_mode<I>(&mut self, items: I, mode: AddMode) -> FeedResult<()>
    where
        I: IntoIterator,
        I::Item: Into<Candidate>,
    {
        let now = self.clock.now();
        self.cache.clean(now);

        let candidates: Vec<Candidate> = items.into_iter().map(Into::into).collect();
        let decisions = reconcile::plan(candidates, &self.cache, now, mode)?;
        let mutations = adapter::write_mutations(&decisions, self.cache.prefix(), now)?;

        if mutations.is_empty() {
            debug!(items = decisions.len(), "nothing to write");
            return Ok(());
        }

        self.store.atomic(mutations).await?;

        let mut written = 0usize;
        for record in decisions.into_iter().filter_map(reconcile::Decision::into_record) {
            self.cache.upsert(record);
            written += 1;
        }
        debug!(written, "items added");
        Ok(())
    }

    /// The item with `id`, if present and not expired.
    pub fn get(&mut self, id: &str) -> Option<Item> {
        self.clean();
        self.cache.get(id).map(|record| record.item.clone())
    }

    /// Items in storage-key order, optionally only those whose group key
    /// equals `group_key`.
    pub fn get_all(&mut self, group_key: Option<&Key>) -> Vec<Item> {
        self.clean();
        self.cache
            .select(group_key)
            .map(|record| record.item.clone())
            .collect()
    }

    /// Whether an item with `id` is present and not expired.
    pub fn has(&mut self, id: &str) -> bool {
        self.clean();
        self.cache.contains(id)
    }

    /// Number of visible items.
    pub fn len(&mut self) -> usize {
        self.clean();
        self.cache.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Delete the item with `id`. Returns whether anything was deleted.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, id: &str) -> FeedResult<bool> {
        self.clean();

        let Some(record) = self.cache.get(id) else {
            return Ok(false);
        };
        let mutations = adapter::delete_mutations([record], self.cache.prefix());

        self.store.atomic(mutations).await?;
        self.cache.remove(id);
        debug!(id, "item removed");
        Ok(true)
    }

    /// Delete every item, or only those whose group key equals `group_key`.
    /// Returns how many items were deleted.
    #[instrument(skip(self, group_key), fields(group = ?group_key.map(ToString::to_string)))]
    pub async fn remove_all(&mut self, group_key: Option<&Key>) -> FeedResult<usize> {
        self.clean();

        let ids: Vec<String> = self
            .cache
            .select(group_key)
            .map(|record| record.id().to_owned())
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mutations = adapter::delete_mutations(self.cache.select(group_key), self.cache.prefix());
        self.store.atomic(mutations).await?;

        for id in &ids {
            self.cache.remove(id);
        }
        debug!(removed = ids.len(), "items removed");
        Ok(ids.len())
    }

    /// Serialize the feed with all visible items in storage-key order.
    pub fn render(&mut self) -> FeedResult<String> {
        let items = self.get_all(None);
        Feed::new(self.info.clone()).with_items(items).to_json()
    }

    /// Release the store handle.
    #[instrument(skip(self), fields(prefix = %self.cache.prefix()))]
    pub async fn dispose(self) -> FeedResult<()> {
        self.store.close().await?;
        info!("feed aggregator disposed");
        Ok(())
    }

    pub fn prefix(&self) -> &Key {
        self.cache.prefix()
    }

    pub fn info(&self) -> &FeedInfo {
        &self.info
    }

    fn clean(&mut self) {
        let now = self.clock.now();
        self.cache.clean(now);
    }
}

// ── tests ────────────────────────────────────────────────────────────
