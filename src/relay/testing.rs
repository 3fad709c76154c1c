//! In-memory collaborators for relay tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{FetchError, TransportError};
use crate::feed::{FeedItem, FeedSource, ParsedFeed};
use crate::relay::Credentials;
use crate::transport::{ChatTransport, MessageHandle, RecentMessage};

/// Feed source answering from a script; the feed title is the URL.
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Result<Vec<FeedItem>, FetchError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, Vec<Instant>>>,
    created: Instant,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            created: Instant::now(),
        }
    }

    pub fn set_items(&self, url: &str, items: &[(&str, &str)]) {
        let items = items.iter().map(|(t, l)| FeedItem::new(*t, *l)).collect();
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(items));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(error));
    }

    pub fn set_delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).map_or(0, Vec::len)
    }

    /// Time of each call relative to the source's creation.
    pub fn call_offsets(&self, url: &str) -> Vec<Duration> {
        self.calls
            .lock()
            .unwrap()
            .get(url)
            .map(|times| times.iter().map(|t| *t - self.created).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn parse(
        &self,
        url: &str,
        _credentials: Option<&Credentials>,
        _timeout: Duration,
    ) -> Result<ParsedFeed, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.scripts.lock().unwrap().get(url).cloned();
        match script {
            Some(Ok(items)) => Ok(ParsedFeed {
                title: url.to_string(),
                items,
            }),
            Some(Err(e)) => Err(e),
            None => Ok(ParsedFeed {
                title: url.to_string(),
                items: Vec::new(),
            }),
        }
    }
}

/// Transport that records deliveries and can be told to fail.
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    history: Mutex<HashMap<String, Vec<RecentMessage>>>,
    fail_next: AtomicUsize,
    rate_limit_next: AtomicUsize,
    send_delay: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            history: Mutex::new(HashMap::new()),
            fail_next: AtomicUsize::new(0),
            rate_limit_next: AtomicUsize::new(0),
            send_delay: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn rate_limit_next(&self, n: usize) {
        self.rate_limit_next.store(n, Ordering::SeqCst);
    }

    /// Hold every send for `delay` before it is recorded.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_history(&self, destination: &str, messages: Vec<RecentMessage>) {
        self.history
            .lock()
            .unwrap()
            .insert(destination.to_string(), messages);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

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

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        destination_id: &str,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if take_one(&self.rate_limit_next) {
            return Err(TransportError::RateLimited {
                retry_after: Duration::from_secs(1),
            });
        }
        if take_one(&self.fail_next) {
            return Err(TransportError::Status {
                status: 500,
                body: "boom".to_string(),
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
            .map(|m| m.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
