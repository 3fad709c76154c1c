//! The relay engine.
//!
//! [`Relay`] owns the registration store, the dedup ledger and the
//! scheduler. Every runtime control goes through it: the store is changed
//! first, then the scheduler is reconciled for the affected destination.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use super::ledger::DedupLedger;
use super::poller::Poller;
use super::registration::Registration;
use super::scheduler::{Scheduler, TimerState};
use super::store::RegistrationStore;
use crate::command;
use crate::config::Config;
use crate::feed::{validate_source_url, FeedSource, Fetcher};
use crate::transport::ChatTransport;
use crate::{RelayError, Result};

/// Status of one destination as reported by `!status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationStatus {
    /// Destination asked about.
    pub destination_id: String,
    /// Timer state.
    pub state: TimerState,
    /// Registration being polled, when running.
    pub registration: Option<Registration>,
    /// Number of registrations (active or paused) on the destination.
    pub registrations: usize,
}

/// Feed relay engine.
pub struct Relay {
    store: Arc<RegistrationStore>,
    ledger: Arc<DedupLedger>,
    scheduler: Scheduler,
    block_private_hosts: bool,
    started_at: DateTime<Utc>,
}

impl Relay {
    /// Build an engine around a feed source and a chat transport.
    pub fn new(
        config: &Config,
        source: Arc<dyn FeedSource>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        let store = Arc::new(RegistrationStore::new(
            config.relay.min_interval_secs,
            config.relay.default_interval_secs,
        ));
        let ledger = Arc::new(DedupLedger::new(config.relay.ledger_capacity));
        let fetcher = Fetcher::new(
            source,
            Duration::from_secs(config.fetch.total_timeout_secs),
        );
        let poller = Poller::new(fetcher, Arc::clone(&ledger), transport, &config.relay);

        Self {
            store,
            ledger,
            scheduler: Scheduler::new(Arc::new(poller)),
            block_private_hosts: config.fetch.block_private_hosts,
            started_at: Utc::now(),
        }
    }

    /// Load the initial registrations and start timers for the active ones.
    ///
    /// Returns the number of running timers.
    pub async fn start(&self, initial: Vec<Registration>) -> usize {
        for registration in initial {
            self.store.upsert(registration).await;
        }
        for destination in self.store.destinations().await {
            self.scheduler.reconcile(&destination, &self.store).await;
        }

        let running = self.scheduler.running_count().await;
        info!(
            registrations = self.store.len().await,
            running, "Relay started"
        );
        running
    }

    /// Add or update a registration and schedule it.
    pub async fn add(&self, registration: Registration) -> Result<Registration> {
        if registration.destination_id.is_empty() {
            return Err(RelayError::Config("destination is required".to_string()));
        }
        validate_source_url(&registration.source_url, self.block_private_hosts)?;

        let stored = self.store.upsert(registration).await;
        self.scheduler
            .reconcile(&stored.destination_id, &self.store)
            .await;
        info!(
            destination = %stored.destination_id,
            source = %stored.source_url,
            interval_secs = stored.interval_secs,
            active = stored.active,
            "Registration added"
        );
        Ok(stored)
    }

    /// Remove every registration of a destination and stop its timer.
    pub async fn remove(&self, destination_id: &str) -> Result<Vec<Registration>> {
        let removed = self.store.remove(destination_id).await;
        if removed.is_empty() {
            return Err(RelayError::NotFound(destination_id.to_string()));
        }
        self.scheduler.reconcile(destination_id, &self.store).await;
        self.ledger.reset(destination_id).await;
        info!(
            destination = destination_id,
            removed = removed.len(),
            "Registrations removed"
        );
        Ok(removed)
    }

    /// Pause a destination.
    pub async fn pause(&self, destination_id: &str) -> Result<()> {
        if !self.store.set_active(destination_id, false).await {
            return Err(RelayError::NotFound(destination_id.to_string()));
        }
        self.scheduler.reconcile(destination_id, &self.store).await;
        info!(destination = destination_id, "Destination paused");
        Ok(())
    }

    /// Resume a destination with its most recent registration.
    pub async fn resume(&self, destination_id: &str) -> Result<Registration> {
        if !self.store.set_active(destination_id, true).await {
            return Err(RelayError::NotFound(destination_id.to_string()));
        }
        self.scheduler.reconcile(destination_id, &self.store).await;
        let registration = self
            .store
            .active_for(destination_id)
            .await
            .ok_or_else(|| RelayError::NotFound(destination_id.to_string()))?;
        info!(destination = destination_id, "Destination resumed");
        Ok(registration)
    }

    /// Status of a destination.
    pub async fn status(&self, destination_id: &str) -> DestinationStatus {
        DestinationStatus {
            destination_id: destination_id.to_string(),
            state: self.scheduler.state(destination_id).await,
            registration: self.scheduler.scheduled(destination_id).await,
            registrations: self.store.list(Some(destination_id)).await.len(),
        }
    }

    /// Snapshot of registrations, optionally for one destination.
    pub async fn list(&self, destination_id: Option<&str>) -> Vec<Registration> {
        self.store.list(destination_id).await
    }

    /// Interpret an inbound chat line.
    ///
    /// `origin` is the destination the line arrived on, if any. Returns the
    /// reply to post, or None when the line is not a recognised directive.
    pub async fn handle_command(&self, origin: Option<&str>, text: &str) -> Option<String> {
        command::interpret(self, origin, text).await
    }

    /// Stop every timer and return the final registrations.
    pub async fn shutdown(&self) -> Vec<Registration> {
        self.scheduler.stop_all().await;
        let snapshot = self.store.list(None).await;
        info!(registrations = snapshot.len(), "Relay stopped");
        snapshot
    }

    /// How long the engine has been up.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    /// The registration store.
    pub fn store(&self) -> &RegistrationStore {
        &self.store
    }

    /// The dedup ledger.
    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
