//! Error types for Feed Relay.

use std::time::Duration;

use thiserror::Error;

/// Common error type for Feed Relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed registration or startup configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A command referenced a destination with no registrations.
    #[error("{0} not found")]
    NotFound(String),

    /// Feed fetch failure.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Chat delivery failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed feed fetch.
///
/// Every variant is transient: the scheduler backs off and tries again on a
/// later tick, it never stops the timer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS, redirect or body read failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete within the allowed time.
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The body exceeded the configured size limit.
    #[error("feed too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    /// The body could not be parsed as a feed.
    #[error("failed to parse feed: {0}")]
    Parse(String),
}

/// A failed chat delivery or history read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent or the response could not be read.
    #[error("request failed: {0}")]
    Request(String),

    /// The chat service rejected the request.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The chat service asked us to slow down.
    #[error("rate limited, retry after {}ms", .retry_after.as_millis())]
    RateLimited { retry_after: Duration },
}

/// Result type alias for Feed Relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
