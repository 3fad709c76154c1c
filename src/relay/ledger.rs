//! Dedup ledger.
//!
//! Remembers, per destination, the fingerprints of the most recently
//! delivered items. Each destination keeps at most `capacity` fingerprints and
//! evicts the oldest first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::feed::FeedItem;

/// Stable identity of a feed item, derived from its title and link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a title/link pair.
    pub fn of(title: &str, link: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"\n");
        hasher.update(link.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Fingerprint a feed item.
    pub fn of_item(item: &FeedItem) -> Self {
        Self::of(&item.title, &item.link)
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

/// FIFO-bounded set for one destination.
#[derive(Default)]
struct History {
    order: VecDeque<Fingerprint>,
    members: HashSet<Fingerprint>,
}

impl History {
    fn insert(&mut self, fingerprint: Fingerprint, capacity: usize) {
        if self.members.contains(&fingerprint) {
            return;
        }
        self.members.insert(fingerprint.clone());
        self.order.push_back(fingerprint);
        while self.order.len() > capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
    }
}

/// Per-destination memory of delivered fingerprints.
pub struct DedupLedger {
    histories: Mutex<HashMap<String, History>>,
    capacity: usize,
}

impl DedupLedger {
    /// Create a ledger keeping `capacity` fingerprints per destination.
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Per-destination capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check whether a fingerprint was delivered to a destination.
    pub async fn seen(&self, destination_id: &str, fingerprint: &Fingerprint) -> bool {
        self.histories
            .lock()
            .await
            .get(destination_id)
            .is_some_and(|h| h.members.contains(fingerprint))
    }

    /// Record a delivered fingerprint, evicting the oldest when full.
    pub async fn record(&self, destination_id: &str, fingerprint: Fingerprint) {
        let mut histories = self.histories.lock().await;
        histories
            .entry(destination_id.to_string())
            .or_default()
            .insert(fingerprint, self.capacity);
    }

    /// Forget everything delivered to a destination.
    pub async fn reset(&self, destination_id: &str) {
        self.histories.lock().await.remove(destination_id);
    }

    /// Number of fingerprints held for a destination.
    pub async fn len(&self, destination_id: &str) -> usize {
        self.histories
            .lock()
            .await
            .get(destination_id)
            .map_or(0, |h| h.order.len())
    }

    /// Check whether a destination has no history.
    pub async fn is_empty(&self, destination_id: &str) -> bool {
        self.len(destination_id).await == 0
    }
}
