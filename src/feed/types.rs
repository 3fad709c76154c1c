//! Feed types for Feed Relay.

use chrono::{DateTime, Utc};

/// Title used when a feed carries none.
pub const UNTITLED_FEED: &str = "Untitled Feed";

/// Title used when an entry carries none.
pub const UNTITLED_ITEM: &str = "Untitled";

/// A feed entry, normalised to the fields the relay delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Entry title.
    pub title: String,
    /// Link to the entry (empty when the feed gives none).
    pub link: String,
}

impl FeedItem {
    /// Create an item.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

/// Output of the feed-parsing collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Feed title.
    pub title: String,
    /// Entries in feed order (newest first for well-behaved feeds).
    pub items: Vec<FeedItem>,
}

/// One successful fetch, produced fresh on each tick.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Feed title.
    pub feed_title: String,
    /// Entries in feed order.
    pub items: Vec<FeedItem>,
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    /// Wrap a parsed feed, stamping it with the current time.
    pub fn from_parsed(feed: ParsedFeed) -> Self {
        Self {
            feed_title: feed.title,
            items: feed.items,
            fetched_at: Utc::now(),
        }
    }

    /// The newest `limit` items, oldest first, ready for delivery.
    pub fn candidates(&self, limit: usize) -> Vec<&FeedItem> {
        let mut newest: Vec<&FeedItem> = self.items.iter().take(limit).collect();
        newest.reverse();
        newest
    }
}
