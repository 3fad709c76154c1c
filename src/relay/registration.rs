//! Registration types.

use std::fmt;
use std::time::Duration;

/// Basic-auth credentials for a protected feed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build credentials from optional cells; both must be non-empty.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            None
        } else {
            Some(Self::new(username, password))
        }
    }
}

// Passwords never reach the logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One feed-to-destination relay.
///
/// Identified by `(source_url, destination_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Feed URL.
    pub source_url: String,
    /// Chat destination (channel ID).
    pub destination_id: String,
    /// Poll interval in seconds.
    pub interval_secs: u64,
    /// Optional basic auth for the feed.
    pub credentials: Option<Credentials>,
    /// Whether the registration should be polled.
    pub active: bool,
    /// Store-assigned revision, bumped on every upsert.
    pub revision: u64,
}

impl Registration {
    /// Create an active registration without credentials.
    pub fn new(
        source_url: impl Into<String>,
        destination_id: impl Into<String>,
        interval_secs: u64,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            destination_id: destination_id.into(),
            interval_secs,
            credentials: None,
            active: true,
            revision: 0,
        }
    }

    /// Set basic auth credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Check whether this registration has the same key as another.
    pub fn same_key(&self, other: &Registration) -> bool {
        self.source_url == other.source_url && self.destination_id == other.destination_id
    }

    /// The poll interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
