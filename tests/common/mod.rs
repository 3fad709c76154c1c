//! Test helpers for relay integration tests.
//!
//! Provides an in-memory feed source, a recording chat transport and a
//! relay builder. Tests run on a paused tokio clock, so sleeps advance
//! virtual time instantly.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use feedrelay::{
    ChatTransport, Config, Credentials, FeedItem, FeedSource, FetchError, MessageHandle,
    ParsedFeed, RecentMessage, Relay, TransportError,
};

/// Feed source serving scripted feeds by URL.
pub struct MockFeedSource {
    feeds: Mutex<HashMap<String, Result<ParsedFeed, FetchError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, Vec<Instant>>>,
    credentials: Mutex<Vec<Option<Credentials>>>,
    epoch: Instant,
}

impl MockFeedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            feeds: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            credentials: Mutex::new(Vec::new()),
            epoch: Instant::now(),
        })
    }

    /// Serve `items` (newest first) under the feed title `title`.
    pub fn serve(&self, url: &str, title: &str, items: &[(&str, &str)]) {
        let feed = ParsedFeed {
            title: title.to_string(),
            items: items.iter().map(|(t, l)| FeedItem::new(*t, *l)).collect(),
        };
        self.feeds.lock().unwrap().insert(url.to_string(), Ok(feed));
    }

    /// Make every fetch of `url` fail.
    pub fn fail(&self, url: &str, error: FetchError) {
        self.feeds.lock().unwrap().insert(url.to_string(), Err(error));
    }

    /// Delay every fetch of `url`.
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Number of fetches started for `url`.
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).map_or(0, Vec::len)
    }

    /// Start time of each fetch of `url`, relative to the source's creation.
    pub fn call_offsets(&self, url: &str) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .get(url)
            .map(|calls| calls.iter().map(|t| *t - self.epoch).collect())
            .unwrap_or_default()
    }

    /// Credentials passed to each fetch, in order.
    pub fn credentials_seen(&self) -> Vec<Option<Credentials>> {
        self.credentials.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for MockFeedSource {
    async fn parse(
        &self,
        url: &str,
        credentials: Option<&Credentials>,
        _timeout: Duration,
    ) -> Result<ParsedFeed, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());
        self.credentials.lock().unwrap().push(credentials.cloned());

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let feed = self.feeds.lock().unwrap().get(url).cloned();
        feed.unwrap_or_else(|| Err(FetchError::Status(404)))
    }
}

/// Chat transport that records what it was asked to post.
pub struct MockChat {
    sent: Mutex<Vec<(String, String)>>,
    history: Mutex<HashMap<String, Vec<RecentMessage>>>,
    failures: AtomicUsize,
    send_delay: Mutex<Option<Duration>>,
}

impl MockChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            failures: AtomicUsize::new(0),
            send_delay: Mutex::new(None),
        })
    }

    /// Reject the next `n` sends.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Take `delay` to complete every send.
    pub fn delay_sends(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    /// Messages already present in a destination, newest first.
    pub fn preload_history(&self, destination: &str, messages: Vec<RecentMessage>) {
        self.history
            .lock()
            .unwrap()
            .insert(destination.to_string(), messages);
    }

    /// Everything sent, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one destination, in order.
    pub fn sent_to(&self, destination: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MockChat {
    async fn send_message(
        &self,
        destination_id: &str,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let mut sent = self.sent.lock().unwrap();
        sent.push((destination_id.to_string(), text.to_string()));
        Ok(MessageHandle {
            destination_id: destination_id.to_string(),
            message_id: sent.len().to_string(),
        })
    }

    async fn fetch_recent_messages(
        &self,
        destination_id: &str,
        limit: usize,
    ) -> Result<Vec<RecentMessage>, TransportError> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(destination_id)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Relay wired to the given mocks with default configuration.
pub fn relay_with(config: &Config, source: &Arc<MockFeedSource>, chat: &Arc<MockChat>) -> Arc<Relay> {
    Arc::new(Relay::new(config, source.clone(), chat.clone()))
}

/// Relay wired to fresh mocks with default configuration.
pub fn setup() -> (Arc<Relay>, Arc<MockFeedSource>, Arc<MockChat>) {
    let source = MockFeedSource::new();
    let chat = MockChat::new();
    let relay = relay_with(&Config::default(), &source, &chat);
    (relay, source, chat)
}

/// Advance virtual time.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

/// Let spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
