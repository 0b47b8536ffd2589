//! Error types for the feed aggregator.
//!
//! Validation errors ([`FeedError::DuplicateInBatch`],
//! [`FeedError::InvalidApproximation`], [`FeedError::AlreadyExists`],
//! [`FeedError::InvalidItem`]) are raised before anything is written, so a
//! rejected call leaves both the cache and the store untouched.
//! [`FeedError::Store`] carries the store's own error unchanged.

use kvfeed_store::StoreError;

/// Alias for `Result<T, FeedError>`.
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors surfaced by [`crate::FeedAggregator`] operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The same item ID appeared twice in one `add` call.
    #[error("item with ID '{id}' added more than once in the same call")]
    DuplicateInBatch { id: String },

    /// Date approximation was requested for an item that already has a
    /// published or modified date.
    #[error("can't approximate date for item with ID '{id}' since it already has a date")]
    InvalidApproximation { id: String },

    /// The item ID is already in the feed and the call forbids overwriting.
    #[error("item with ID '{id}' already exists")]
    AlreadyExists { id: String },

    /// The item cannot be stored as given.
    #[error("invalid item '{id}': {reason}")]
    InvalidItem { id: String, reason: String },

    /// The backing store failed; nothing from the call was applied.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A record could not be converted to or from JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeedError {
    /// Whether the error came from caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInBatch { .. }
                | Self::InvalidApproximation { .. }
                | Self::AlreadyExists { .. }
                | Self::InvalidItem { .. }
        )
    }
}
