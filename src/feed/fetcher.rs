//! Feed fetching.
//!
//! [`FeedSource`] is the parsing collaborator: it turns a URL into a
//! [`ParsedFeed`]. [`Fetcher`] wraps a source with the per-registration
//! policy (credentials, timeout bounded by the poll interval) and never
//! retries on its own; backoff belongs to the scheduler.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::feed::types::{FeedItem, FetchResult, ParsedFeed, UNTITLED_FEED, UNTITLED_ITEM};
use crate::relay::{Credentials, Registration};
use crate::{RelayError, Result};

/// Fetches and parses a feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch `url`, authenticating with `credentials` when given, and give up
    /// after `timeout`.
    async fn parse(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> std::result::Result<ParsedFeed, FetchError>;
}

/// HTTP feed source backed by reqwest and feed-rs.
pub struct HttpFeedSource {
    client: Client,
    max_feed_size: u64,
}

impl HttpFeedSource {
    /// Create a source from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn parse(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        timeout: Duration,
    ) -> std::result::Result<ParsedFeed, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(creds) = credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = request.send().await.map_err(|e| classify(e, timeout))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FetchError::TooLarge {
                    size: content_length,
                    max: self.max_feed_size,
                });
            }
        }

        let bytes = response.bytes().await.map_err(|e| classify(e, timeout))?;
        if bytes.len() as u64 > self.max_feed_size {
            return Err(FetchError::TooLarge {
                size: bytes.len() as u64,
                max: self.max_feed_size,
            });
        }

        parse_feed(&bytes)
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Request(err.to_string())
    }
}

/// Parse feed bytes (RSS, Atom or JSON Feed) into a [`ParsedFeed`].
pub fn parse_feed(bytes: &[u8]) -> std::result::Result<ParsedFeed, FetchError> {
    let feed = parser::parse(bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED_FEED.to_string());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let item_title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED_ITEM.to_string());
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            FeedItem::new(item_title, link)
        })
        .collect();

    Ok(ParsedFeed { title, items })
}

/// Fetch step of a poll cycle.
#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn FeedSource>,
    max_timeout: Duration,
}

impl Fetcher {
    /// Wrap a source; no request may take longer than `max_timeout`.
    pub fn new(source: Arc<dyn FeedSource>, max_timeout: Duration) -> Self {
        Self {
            source,
            max_timeout,
        }
    }

    /// Timeout for one fetch of a registration: never longer than its interval.
    pub fn timeout_for(&self, registration: &Registration) -> Duration {
        self.max_timeout.min(registration.interval())
    }

    /// Fetch a registration's feed once.
    pub async fn fetch(
        &self,
        registration: &Registration,
    ) -> std::result::Result<FetchResult, FetchError> {
        let timeout = self.timeout_for(registration);
        debug!(
            source = %registration.source_url,
            timeout_secs = timeout.as_secs(),
            "Fetching feed"
        );

        let parse = self.source.parse(
            &registration.source_url,
            registration.credentials.as_ref(),
            timeout,
        );
        match tokio::time::timeout(timeout, parse).await {
            Ok(Ok(feed)) => Ok(FetchResult::from_parsed(feed)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }
}

/// Check that a feed URL can be polled.
///
/// Accepts `http` and `https` URLs with a host. With `block_private_hosts`,
/// loopback, private and intranet hosts are refused as well.
pub fn validate_source_url(url: &str, block_private_hosts: bool) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| RelayError::Config(format!("invalid URL {url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(RelayError::Config(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| RelayError::Config(format!("URL has no host: {url}")))?;

    if !block_private_hosts {
        return Ok(());
    }

    let refused = match host {
        url::Host::Domain(domain) => is_intranet_hostname(domain),
        url::Host::Ipv4(ipv4) => is_private_ip(&IpAddr::V4(ipv4)),
        url::Host::Ipv6(ipv6) => is_private_ip(&IpAddr::V6(ipv6)),
    };
    if refused {
        return Err(RelayError::Config(format!("private host not allowed: {host}")));
    }
    Ok(())
}

fn is_intranet_hostname(host: &str) -> bool {
    const SUFFIXES: &[&str] = &[".local", ".localhost", ".internal", ".intranet", ".lan"];

    let host = host.to_lowercase();
    host == "localhost" || SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}
