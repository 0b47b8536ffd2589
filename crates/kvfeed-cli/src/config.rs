//! Feed configuration.
//!
//! Reads the `[feed]` section from `config/default.toml` (or the file given
//! with `--config`). Missing files, sections, and keys fall back to
//! defaults. `KVFEED_DATABASE` overrides the database path, and CLI flags
//! override everything.

use std::path::{Path, PathBuf};

use kvfeed_core::FeedInfo;
use kvfeed_store::{Key, MAX_LIST_BATCH_SIZE};
use tracing::{debug, warn};

/// Environment variable overriding [`FeedConfig::database`].
pub const DATABASE_ENV: &str = "KVFEED_DATABASE";

/// Settings loaded from the `[feed]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Key prefix the feed lives under.
    pub prefix: Key,
    pub title: String,
    pub home_page_url: Option<String>,
    pub feed_url: Option<String>,
    pub description: Option<String>,
    /// Page size for the initial load.
    pub list_batch_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/kvfeed.db"),
            prefix: Key::new(["feed"]),
            title: "kvfeed".to_string(),
            home_page_url: None,
            feed_url: None,
            description: None,
            list_batch_size: MAX_LIST_BATCH_SIZE,
        }
    }
}

impl FeedConfig {
    /// Load from `path`, falling back to defaults if the file is missing or
    /// unreadable.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(err) => {
                debug!(path = %path.display(), %err, "config file not read, using defaults");
                Self::default()
            }
        }
    }

    /// Parse the `[feed]` section of a TOML document.
    pub fn from_toml_str(content: &str) -> Self {
        let defaults = Self::default();

        let table: toml::Table = match content.parse() {
            Ok(t) => t,
            Err(err) => {
                warn!(%err, "config is not valid TOML, using defaults");
                return defaults;
            }
        };

        let feed = match table.get("feed") {
            Some(toml::Value::Table(f)) => f,
            _ => return defaults,
        };

        let string = |name: &str| feed.get(name).and_then(|v| v.as_str()).map(str::to_owned);

        Self {
            database: string("database")
                .map(PathBuf::from)
                .unwrap_or(defaults.database),
            prefix: feed
                .get("prefix")
                .and_then(|v| v.as_array())
                .and_then(|segments| {
                    segments
                        .iter()
                        .map(|s| s.as_str().map(str::to_owned))
                        .collect::<Option<Vec<_>>>()
                })
                .filter(|segments| !segments.is_empty())
                .map(Key::from)
                .unwrap_or(defaults.prefix),
            title: string("title").unwrap_or(defaults.title),
            home_page_url: string("home_page_url"),
            feed_url: string("feed_url"),
            description: string("description"),
            list_batch_size: feed
                .get("list_batch_size")
                .and_then(|v| v.as_integer())
                .map(|v| v.clamp(1, MAX_LIST_BATCH_SIZE as i64) as usize)
                .unwrap_or(defaults.list_batch_size),
        }
    }

    /// Apply the environment and command-line overrides, flags last.
    pub fn with_overrides(
        mut self,
        env_database: Option<String>,
        database: Option<PathBuf>,
        prefix: Option<&str>,
    ) -> Self {
        if let Some(path) = env_database.filter(|p| !p.is_empty()) {
            self.database = PathBuf::from(path);
        }
        if let Some(path) = database {
            self.database = path;
        }
        if let Some(prefix) = prefix {
            let key = parse_key(prefix);
            if !key.is_empty() {
                self.prefix = key;
            }
        }
        self
    }

    pub fn feed_info(&self) -> FeedInfo {
        let mut info = FeedInfo::new(self.title.clone());
        info.home_page_url = self.home_page_url.clone();
        info.feed_url = self.feed_url.clone();
        info.description = self.description.clone();
        info
    }
}

/// Parse a `/`-separated key, ignoring empty segments.
pub fn parse_key(text: &str) -> Key {
    text.split('/').filter(|s| !s.is_empty()).collect()
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_section_is_read() {
        let config = FeedConfig::from_toml_str(
            r#"
            [feed]
            database = "/tmp/feed.db"
            prefix = ["my", "example", "feed"]
            title = "My Example Feed"
            home_page_url = "https://example.org"
            feed_url = "https://example.org/feed.json"
            description = "news"
            list_batch_size = 50
            "#,
        );

        assert_eq!(config.database, PathBuf::from("/tmp/feed.db"));
        assert_eq!(config.prefix, Key::new(["my", "example", "feed"]));
        assert_eq!(config.title, "My Example Feed");
        assert_eq!(config.list_batch_size, 50);

        let info = config.feed_info();
        assert_eq!(info.feed_url.as_deref(), Some("https://example.org/feed.json"));
        assert_eq!(info.description.as_deref(), Some("news"));
    }

    #[test]
    fn missing_section_uses_defaults() {
        assert_eq!(FeedConfig::from_toml_str("[other]\nx = 1\n"), FeedConfig::default());
        assert_eq!(FeedConfig::from_toml_str("not = [valid"), FeedConfig::default());
    }

    #[test]
    fn bad_values_fall_back() {
        let config = FeedConfig::from_toml_str(
            r#"
            [feed]
            prefix = ["ok", 3]
            list_batch_size = 5000
            "#,
        );

        assert_eq!(config.prefix, FeedConfig::default().prefix);
        assert_eq!(config.list_batch_size, MAX_LIST_BATCH_SIZE);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FeedConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(config, FeedConfig::default());
    }

    #[test]
    fn flags_override_environment() {
        let config = FeedConfig::default().with_overrides(
            Some("/env/feed.db".into()),
            Some(PathBuf::from("/flag/feed.db")),
            Some("a/b"),
        );
        assert_eq!(config.database, PathBuf::from("/flag/feed.db"));
        assert_eq!(config.prefix, Key::new(["a", "b"]));

        let config = FeedConfig::default().with_overrides(Some("/env/feed.db".into()), None, None);
        assert_eq!(config.database, PathBuf::from("/env/feed.db"));
    }

    #[test]
    fn parse_key_drops_empty_segments() {
        assert_eq!(parse_key("/my//subprefix/"), Key::new(["my", "subprefix"]));
        assert!(parse_key("").is_empty());
    }
}
