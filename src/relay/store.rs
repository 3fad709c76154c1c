//! Registration store.
//!
//! Holds every registration in insertion order behind a single lock. Readers
//! always get copies, so a registration never changes under a caller that is
//! iterating over a listing.

use tokio::sync::RwLock;

use super::registration::Registration;

/// Thread-safe set of registrations.
pub struct RegistrationStore {
    /// Registrations and the next revision number.
    inner: RwLock<StoreInner>,
    /// Politeness floor applied to every interval.
    min_interval_secs: u64,
    /// Interval used when a registration arrives with 0.
    default_interval_secs: u64,
}

struct StoreInner {
    registrations: Vec<Registration>,
    next_revision: u64,
}

impl RegistrationStore {
    /// Create an empty store with the given interval floor and default.
    pub fn new(min_interval_secs: u64, default_interval_secs: u64) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                registrations: Vec::new(),
                next_revision: 1,
            }),
            min_interval_secs,
            default_interval_secs,
        }
    }

    /// Apply the default and the floor to an interval.
    pub fn normalize_interval(&self, interval_secs: u64) -> u64 {
        let interval = if interval_secs == 0 {
            self.default_interval_secs
        } else {
            interval_secs
        };
        interval.max(self.min_interval_secs)
    }

    /// Insert a registration, or update the mutable fields of the one with
    /// the same key.
    ///
    /// An active registration supersedes the other registrations on its
    /// destination: they are deactivated, since a destination runs one timer.
    /// Returns the stored copy.
    pub async fn upsert(&self, mut registration: Registration) -> Registration {
        registration.interval_secs = self.normalize_interval(registration.interval_secs);

        let mut inner = self.inner.write().await;
        registration.revision = inner.next_revision;
        inner.next_revision += 1;

        if registration.active {
            for other in inner.registrations.iter_mut() {
                if other.destination_id == registration.destination_id
                    && !other.same_key(&registration)
                {
                    other.active = false;
                }
            }
        }

        match inner
            .registrations
            .iter_mut()
            .find(|r| r.same_key(&registration))
        {
            Some(existing) => {
                existing.interval_secs = registration.interval_secs;
                existing.credentials = registration.credentials.clone();
                existing.active = registration.active;
                existing.revision = registration.revision;
                existing.clone()
            }
            None => {
                inner.registrations.push(registration.clone());
                registration
            }
        }
    }

    /// Set the active flag for a destination.
    ///
    /// Deactivation applies to every registration of the destination;
    /// activation only to the most recently upserted one. Returns false when
    /// the destination has no registrations.
    pub async fn set_active(&self, destination_id: &str, active: bool) -> bool {
        let mut inner = self.inner.write().await;

        let newest = inner
            .registrations
            .iter()
            .filter(|r| r.destination_id == destination_id)
            .map(|r| r.revision)
            .max();
        let Some(newest) = newest else {
            return false;
        };

        for reg in inner
            .registrations
            .iter_mut()
            .filter(|r| r.destination_id == destination_id)
        {
            reg.active = active && reg.revision == newest;
        }
        true
    }

    /// Remove every registration of a destination, returning the removed ones.
    pub async fn remove(&self, destination_id: &str) -> Vec<Registration> {
        let mut inner = self.inner.write().await;
        let (removed, kept): (Vec<_>, Vec<_>) = inner
            .registrations
            .drain(..)
            .partition(|r| r.destination_id == destination_id);
        inner.registrations = kept;
        removed
    }

    /// Snapshot of registrations in insertion order, optionally for one
    /// destination.
    pub async fn list(&self, destination_id: Option<&str>) -> Vec<Registration> {
        let inner = self.inner.read().await;
        inner
            .registrations
            .iter()
            .filter(|r| destination_id.map_or(true, |d| r.destination_id == d))
            .cloned()
            .collect()
    }

    /// The active registration of a destination, if any.
    pub async fn active_for(&self, destination_id: &str) -> Option<Registration> {
        let inner = self.inner.read().await;
        inner
            .registrations
            .iter()
            .filter(|r| r.destination_id == destination_id && r.active)
            .max_by_key(|r| r.revision)
            .cloned()
    }

    /// Distinct destinations in first-seen order.
    pub async fn destinations(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        let mut result: Vec<String> = Vec::new();
        for reg in &inner.registrations {
            if !result.contains(&reg.destination_id) {
                result.push(reg.destination_id.clone());
            }
        }
        result
    }

    /// Number of registrations.
    pub async fn len(&self) -> usize {
        self.inner.read().await.registrations.len()
    }

    /// Check if the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
