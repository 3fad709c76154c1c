//! Feed fetching for Feed Relay.
//!
//! Fetching, parsing and the retry delay applied after failures.

pub mod backoff;
pub mod fetcher;
pub mod types;

pub use backoff::{Backoff, INITIAL_BACKOFF};
pub use fetcher::{parse_feed, validate_source_url, FeedSource, Fetcher, HttpFeedSource};
pub use types::{FeedItem, FetchResult, ParsedFeed, UNTITLED_FEED, UNTITLED_ITEM};
