//! # kvfeed-core
//!
//! A de-duplicating, optionally expiring collection of feed items, kept in
//! an ordered key-value store and rendered as a JSON Feed 1.1 document.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  FeedAggregator (create / add / get / remove │
//! │                  / render / dispose)         │
//! ├──────────────────────────────────────────────┤
//! │  reconcile  (insert / replace / merge /      │
//! │              skip / drop per candidate)      │
//! │  ItemCache  (key-ordered index, expiry)      │
//! │  adapter    (load, atomic write/delete)      │
//! ├──────────────────────────────────────────────┤
//! │  kvfeed-store: KvStore / SqliteKv            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use kvfeed_core::{Candidate, FeedAggregator, FeedInfo, FeedOptions, Item};
//! use kvfeed_store::{Key, SqliteKv};
//!
//! let store = SqliteKv::open("data/feed.db").await?;
//! let info = FeedInfo::new("My Feed").feed_url("https://example.org/feed.json");
//! let mut feed = FeedAggregator::create(store, Key::new(["my", "feed"]), info, FeedOptions::default()).await?;
//! feed.add([Candidate::new(Item::new("1").content_text("hello")).approximate_date()]).await?;
//! let json = feed.render()?;
//! feed.dispose().await?;
//! ```

pub mod adapter;
pub mod aggregator;
pub mod cache;
pub mod clock;
pub mod error;
pub mod feed;
pub mod reconcile;
pub mod record;

// ── re-exports ───────────────────────────────────────────────────────

pub use aggregator::{FeedAggregator, FeedOptions};
pub use cache::ItemCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FeedError, FeedResult};
pub use feed::{Attachment, Author, Feed, FeedInfo, Hub, Item, JSON_FEED_VERSION};
pub use reconcile::{AddMode, Decision};
pub use record::{Candidate, Record};
