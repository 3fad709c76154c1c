//! One poll cycle: fetch, dedup, deliver, record.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ledger::{DedupLedger, Fingerprint};
use super::registration::Registration;
use super::scheduler::StopToken;
use crate::config::RelayConfig;
use crate::error::{FetchError, TransportError};
use crate::feed::{FeedItem, Fetcher};
use crate::transport::ChatTransport;

/// Render the chat message for an item.
pub fn render_message(feed_title: &str, item: &FeedItem) -> String {
    let body = if item.link.is_empty() {
        &item.title
    } else {
        &item.link
    };
    format!("**{feed_title}**\n{body}")
}

/// What a successful cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Items delivered and recorded.
    pub delivered: usize,
    /// Candidates already in the ledger.
    pub skipped: usize,
    /// Deliveries the transport rejected; they stay eligible.
    pub failed: usize,
    /// Candidates recorded from destination history instead of being sent.
    pub seeded: usize,
    /// The timer was stopped while the fetch was in flight.
    pub cancelled: bool,
}

/// Runs poll cycles on behalf of every timer.
pub struct Poller {
    fetcher: Fetcher,
    ledger: Arc<DedupLedger>,
    transport: Arc<dyn ChatTransport>,
    max_items_per_tick: usize,
    bootstrap_from_history: bool,
    history_limit: usize,
}

impl Poller {
    /// Create a poller.
    pub fn new(
        fetcher: Fetcher,
        ledger: Arc<DedupLedger>,
        transport: Arc<dyn ChatTransport>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            fetcher,
            ledger,
            transport,
            max_items_per_tick: config.max_items_per_tick.max(1),
            bootstrap_from_history: config.bootstrap_from_history,
            history_limit: config.history_limit,
        }
    }

    /// Run one cycle for a registration.
    ///
    /// Fetch errors are returned for the caller to back off on. Delivery
    /// errors are logged and counted; the item is left unrecorded so the next
    /// cycle tries it again.
    pub async fn poll_once(
        &self,
        registration: &Registration,
        stop: &StopToken,
    ) -> Result<TickReport, FetchError> {
        let destination = registration.destination_id.as_str();
        let result = self.fetcher.fetch(registration).await?;
        debug!(
            destination,
            items = result.items.len(),
            fetched_at = %result.fetched_at,
            "Feed fetched"
        );

        let mut report = TickReport::default();
        if stop.is_stopped() {
            debug!(destination, "Timer stopped during fetch, discarding result");
            report.cancelled = true;
            return Ok(report);
        }

        let candidates = result.candidates(self.max_items_per_tick);
        if candidates.is_empty() {
            debug!(destination, source = %registration.source_url, "Feed has no items");
            return Ok(report);
        }

        if self.bootstrap_from_history && self.ledger.is_empty(destination).await {
            report.seeded = self
                .seed_from_history(destination, &result.feed_title, &candidates)
                .await;
        }

        for item in candidates {
            let fingerprint = Fingerprint::of_item(item);
            if self.ledger.seen(destination, &fingerprint).await {
                report.skipped += 1;
                continue;
            }
            if stop.is_stopped() {
                report.cancelled = true;
                break;
            }

            let text = render_message(&result.feed_title, item);
            match self.transport.send_message(destination, &text).await {
                Ok(handle) => {
                    self.ledger.record(destination, fingerprint.clone()).await;
                    report.delivered += 1;
                    info!(
                        destination,
                        message_id = %handle.message_id,
                        fingerprint = %fingerprint,
                        title = %item.title,
                        "Delivered feed item"
                    );
                }
                Err(TransportError::RateLimited { retry_after }) => {
                    report.failed += 1;
                    warn!(
                        destination,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Rate limited, deferring remaining items to the next tick"
                    );
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(destination, error = %e, "Failed to deliver feed item");
                }
            }
        }

        Ok(report)
    }

    /// Record candidates the relay already posted before the ledger knew
    /// about them. Returns how many were recorded.
    async fn seed_from_history(
        &self,
        destination: &str,
        feed_title: &str,
        candidates: &[&FeedItem],
    ) -> usize {
        let history = match self
            .transport
            .fetch_recent_messages(destination, self.history_limit)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!(destination, error = %e, "Could not read destination history");
                return 0;
            }
        };

        let posted: HashSet<&str> = history
            .iter()
            .filter(|m| m.author_is_self)
            .map(|m| m.text.as_str())
            .collect();

        let mut seeded = 0;
        for item in candidates {
            if posted.contains(render_message(feed_title, item).as_str()) {
                self.ledger
                    .record(destination, Fingerprint::of_item(item))
                    .await;
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!(destination, seeded, "Seeded dedup ledger from history");
        }
        seeded
    }
}
