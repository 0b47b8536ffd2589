//! JSON Feed 1.1 document model and renderer.
//!
//! [`FeedInfo`] describes the feed itself, [`Item`] a single entry. Optional
//! fields are omitted from the output when absent, and keys the model does
//! not know (JSON Feed extensions start with `_`) are kept in
//! [`Item::extensions`] so they survive a store round-trip.
//!
//! Serialization is stable: fields are written in declaration order and
//! items in the order they were added to the [`Feed`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FeedResult;

/// The `version` URL written into every rendered document.
pub const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";

// ═══════════════════════════════════════════════════════════════════════
//  Model
// ═══════════════════════════════════════════════════════════════════════

/// Author of a feed or item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Real-time notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

/// Related resource such as an audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_in_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_in_seconds: Option<f64>,
}

/// Feed-level metadata rendered ahead of the items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hubs: Vec<Hub>,
}

impl FeedInfo {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn home_page_url(mut self, url: impl Into<String>) -> Self {
        self.home_page_url = Some(url.into());
        self
    }

    pub fn feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Keys [`Item`] serializes itself; extensions may not reuse them.
const ITEM_FIELDS: &[&str] = &[
    "id",
    "url",
    "external_url",
    "title",
    "content_html",
    "content_text",
    "summary",
    "image",
    "banner_image",
    "date_published",
    "date_modified",
    "authors",
    "tags",
    "language",
    "attachments",
];

/// A single feed entry, identified by [`Item::id`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Keys outside the JSON Feed vocabulary, kept verbatim.
    #[serde(flatten)]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content_html(mut self, html: impl Into<String>) -> Self {
        self.content_html = Some(html.into());
        self
    }

    pub fn content_text(mut self, text: impl Into<String>) -> Self {
        self.content_text = Some(text.into());
        self
    }

    pub fn date_published(mut self, at: DateTime<Utc>) -> Self {
        self.date_published = Some(at);
        self
    }

    pub fn date_modified(mut self, at: DateTime<Utc>) -> Self {
        self.date_modified = Some(at);
        self
    }

    /// Whether the item carries a published or modified date.
    pub fn is_dated(&self) -> bool {
        self.date_published.is_some() || self.date_modified.is_some()
    }

    /// First extension key that shadows a modeled field, if any.
    ///
    /// Such a key would be written twice and read back into the field.
    pub fn shadowed_extension(&self) -> Option<&str> {
        self.extensions
            .keys()
            .map(String::as_str)
            .find(|key| ITEM_FIELDS.contains(key))
    }

    /// Field-wise equality ignoring both date fields.
    pub fn eq_ignoring_dates(&self, other: &Item) -> bool {
        let strip = |item: &Item| Item {
            date_published: None,
            date_modified: None,
            ..item.clone()
        };
        strip(self) == strip(other)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Renderer
// ═══════════════════════════════════════════════════════════════════════

/// A feed document ready to serialize.
#[derive(Debug, Clone)]
pub struct Feed {
    info: FeedInfo,
    items: Vec<Item>,
}

#[derive(Serialize)]
struct Document<'a> {
    version: &'static str,
    #[serde(flatten)]
    info: &'a FeedInfo,
    items: &'a [Item],
}

impl Feed {
    pub fn new(info: FeedInfo) -> Self {
        Self {
            info,
            items: Vec::new(),
        }
    }

    /// Append items, keeping their order.
    pub fn add(&mut self, items: impl IntoIterator<Item = Item>) {
        self.items.extend(items);
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = Item>) -> Self {
        self.add(items);
        self
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Serialize to a compact JSON Feed 1.1 document.
    pub fn to_json(&self) -> FeedResult<String> {
        let document = Document {
            version: JSON_FEED_VERSION,
            info: &self.info,
            items: &self.items,
        };
        Ok(serde_json::to_string(&document)?)
    }
}

// ── tests ────────────────────────────────────────────────────────────
