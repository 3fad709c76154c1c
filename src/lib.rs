//! Feed Relay - polls RSS/Atom feeds and relays new items into chat channels.
//!
//! Each destination runs its own poll timer. New items are detected with a
//! bounded per-destination ledger of fingerprints, so an item is posted at
//! most once while it stays in the ledger's window.

pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod error;
pub mod feed;
pub mod loader;
pub mod logging;
pub mod relay;
pub mod transport;

pub use cli::Cli;
pub use config::Config;
pub use error::{FetchError, RelayError, Result, TransportError};
pub use feed::{FeedItem, FeedSource, FetchResult, HttpFeedSource, ParsedFeed};
pub use relay::{
    Credentials, DestinationStatus, Registration, Relay, TimerId, TimerState,
};
pub use transport::{ChatTransport, DiscordTransport, MessageHandle, RecentMessage, StdoutTransport};
