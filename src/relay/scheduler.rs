//! Per-destination poll timers.
//!
//! Each destination with an active registration gets one tokio task that
//! ticks at the registration's interval and runs a poll cycle through the
//! shared [`Poller`]. The scheduler owns every task's stop handle; nothing
//! else can reach a running timer.
//!
//! Stopping a timer signals its task and forgets the handle. A cycle already
//! in flight may finish, but the task checks the signal before every tick and
//! before each delivery, so no new cycle starts once `stop` has returned.
//!
//! Cycles of one destination hold that destination's cycle lock, so a
//! replacement timer waits for a stopped timer's last cycle to finish before
//! running its own.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::poller::Poller;
use super::registration::Registration;
use super::store::RegistrationStore;
use crate::feed::Backoff;

/// How long shutdown waits for in-flight cycles before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Opaque identity of one started timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Receiving side of a timer's stop signal.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: Option<watch::Receiver<bool>>,
}

impl StopToken {
    fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx: Some(rx) })
    }

    /// A token that is never stopped.
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// A token that is already stopped.
    pub fn stopped() -> Self {
        let (_tx, rx) = watch::channel(true);
        Self { rx: Some(rx) }
    }

    /// Check whether a stop was requested (a dropped sender counts).
    pub fn is_stopped(&self) -> bool {
        match &self.rx {
            None => false,
            Some(rx) => *rx.borrow() || rx.has_changed().is_err(),
        }
    }

    /// Wait until a stop is requested.
    pub async fn wait(&mut self) {
        match &mut self.rx {
            None => std::future::pending::<()>().await,
            Some(rx) => {
                let _ = rx.wait_for(|stopped| *stopped).await;
            }
        }
    }
}

/// Scheduler-side handle of a running timer.
struct TimerHandle {
    id: TimerId,
    registration: Registration,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn signal_stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// State of a destination's timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer for the destination.
    Stopped,
    /// A timer is ticking for the destination.
    Running,
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerState::Stopped => write!(f, "stopped"),
            TimerState::Running => write!(f, "running"),
        }
    }
}

/// Owner of every poll timer, keyed by destination.
pub struct Scheduler {
    poller: Arc<Poller>,
    timers: Mutex<HashMap<String, TimerHandle>>,
    cycle_locks: std::sync::Mutex<HashMap<String, CycleLock>>,
    next_id: AtomicU64,
}

/// Held for the duration of one poll cycle of a destination.
type CycleLock = Arc<Mutex<()>>;

impl Scheduler {
    /// Create a scheduler that runs cycles through `poller`.
    pub fn new(poller: Arc<Poller>) -> Self {
        Self {
            poller,
            timers: Mutex::new(HashMap::new()),
            cycle_locks: std::sync::Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a timer for a registration, replacing any timer already
    /// running for its destination.
    pub async fn start(&self, registration: Registration) -> TimerId {
        let mut timers = self.timers.lock().await;
        self.start_locked(&mut timers, registration)
    }

    fn start_locked(
        &self,
        timers: &mut HashMap<String, TimerHandle>,
        registration: Registration,
    ) -> TimerId {
        let destination = registration.destination_id.clone();
        if let Some(old) = timers.remove(&destination) {
            old.signal_stop();
            debug!(destination = %destination, timer = %old.id, "Replaced timer");
        }

        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (stop, token) = StopToken::pair();
        let task = tokio::spawn(run_timer(
            Arc::clone(&self.poller),
            registration.clone(),
            self.cycle_lock(&destination),
            token,
            id,
        ));

        info!(
            destination = %destination,
            source = %registration.source_url,
            interval_secs = registration.interval_secs,
            timer = %id,
            "Timer started"
        );
        timers.insert(
            destination,
            TimerHandle {
                id,
                registration,
                stop,
                task,
            },
        );
        id
    }

    fn cycle_lock(&self, destination_id: &str) -> CycleLock {
        let mut locks = self
            .cycle_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(destination_id.to_string()).or_default())
    }

    /// Stop a destination's timer. Returns false if none was running.
    pub async fn stop(&self, destination_id: &str) -> bool {
        let handle = self.timers.lock().await.remove(destination_id);
        match handle {
            Some(handle) => {
                handle.signal_stop();
                info!(destination = destination_id, timer = %handle.id, "Timer stopped");
                true
            }
            None => false,
        }
    }

    /// Bring a destination's timer in line with the store: run the active
    /// registration if there is one, otherwise stop.
    ///
    /// A timer already running the same revision is left alone.
    pub async fn reconcile(&self, destination_id: &str, store: &RegistrationStore) -> TimerState {
        let mut timers = self.timers.lock().await;
        match store.active_for(destination_id).await {
            Some(registration) => {
                let current = timers.get(destination_id).map(|h| &h.registration);
                if current != Some(&registration) {
                    self.start_locked(&mut timers, registration);
                }
                TimerState::Running
            }
            None => {
                if let Some(handle) = timers.remove(destination_id) {
                    handle.signal_stop();
                    info!(destination = destination_id, timer = %handle.id, "Timer stopped");
                }
                TimerState::Stopped
            }
        }
    }

    /// State of a destination's timer.
    pub async fn state(&self, destination_id: &str) -> TimerState {
        if self.is_running(destination_id).await {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }

    /// Check whether a destination has a running timer.
    pub async fn is_running(&self, destination_id: &str) -> bool {
        self.timers.lock().await.contains_key(destination_id)
    }

    /// Identity of a destination's running timer.
    pub async fn timer_id(&self, destination_id: &str) -> Option<TimerId> {
        self.timers.lock().await.get(destination_id).map(|h| h.id)
    }

    /// Registration a destination's timer is polling.
    pub async fn scheduled(&self, destination_id: &str) -> Option<Registration> {
        self.timers
            .lock()
            .await
            .get(destination_id)
            .map(|h| h.registration.clone())
    }

    /// Number of running timers.
    pub async fn running_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Destinations with running timers, sorted.
    pub async fn running_destinations(&self) -> Vec<String> {
        let mut destinations: Vec<String> = self.timers.lock().await.keys().cloned().collect();
        destinations.sort();
        destinations
    }

    /// Stop every timer and wait briefly for in-flight cycles to finish.
    pub async fn stop_all(&self) {
        let handles: Vec<TimerHandle> = self.timers.lock().await.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.signal_stop();
        }
        for mut handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle.task)
                .await
                .is_err()
            {
                warn!(timer = %handle.id, "Timer did not finish in time, aborting");
                handle.task.abort();
            }
        }
    }
}

/// Body of a timer task.
async fn run_timer(
    poller: Arc<Poller>,
    registration: Registration,
    cycle_lock: CycleLock,
    mut stop: StopToken,
    id: TimerId,
) {
    let destination = registration.destination_id.as_str();
    let mut ticker = interval(registration.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut backoff = Backoff::new(registration.interval());

    loop {
        tokio::select! {
            biased;
            _ = stop.wait() => break,
            _ = ticker.tick() => {}
        }

        // a replaced timer may still be finishing its last cycle
        let cycle = tokio::select! {
            biased;
            _ = stop.wait() => break,
            guard = cycle_lock.lock() => guard,
        };
        if stop.is_stopped() {
            break;
        }

        let outcome = poller.poll_once(&registration, &stop).await;
        drop(cycle);

        match outcome {
            Ok(report) => {
                backoff.reset();
                debug!(
                    destination,
                    timer = %id,
                    delivered = report.delivered,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Tick complete"
                );
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    destination,
                    source = %registration.source_url,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "Feed fetch failed"
                );
                tokio::select! {
                    biased;
                    _ = stop.wait() => break,
                    _ = sleep(delay) => {}
                }
            }
        }
    }

    debug!(destination, timer = %id, "Timer task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::error::FetchError;
    use crate::feed::Fetcher;
    use crate::relay::ledger::DedupLedger;
    use crate::relay::testing::{RecordingTransport, ScriptedSource};

    struct Fixture {
        source: Arc<ScriptedSource>,
        transport: Arc<RecordingTransport>,
        scheduler: Scheduler,
    }

    fn fixture() -> Fixture {
        let source = Arc::new(ScriptedSource::new());
        let transport = Arc::new(RecordingTransport::new());
        let config = RelayConfig {
            bootstrap_from_history: false,
            ..RelayConfig::default()
        };
        let poller = Poller::new(
            Fetcher::new(source.clone(), Duration::from_secs(30)),
            Arc::new(DedupLedger::new(config.ledger_capacity)),
            transport.clone(),
            &config,
        );
        Fixture {
            source,
            transport,
            scheduler: Scheduler::new(Arc::new(poller)),
        }
    }

    /// Let spawned timer tasks run until they block on the clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate_then_periodic() {
        let f = fixture();
        f.source.set_items("feedA", &[("X", "http://x")]);
        f.scheduler.start(Registration::new("feedA", "chan1", 15)).await;

        settle().await;
        assert_eq!(f.source.calls("feedA"), 1);

        sleep(Duration::from_secs(15)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 2);

        sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 4);
        assert_eq!(f.transport.sent_to("chan1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_replaces_existing_timer() {
        let f = fixture();
        let first = f.scheduler.start(Registration::new("feedA", "chan1", 15)).await;
        let second = f.scheduler.start(Registration::new("feedB", "chan1", 15)).await;

        assert_ne!(first, second);
        assert_eq!(f.scheduler.running_count().await, 1);
        assert_eq!(f.scheduler.timer_id("chan1").await, Some(second));

        settle().await;
        sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 0);
        assert!(f.source.calls("feedB") >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_waits_for_cycle_in_flight() {
        let f = fixture();
        f.source.set_items("feedA", &[("X", "http://x")]);
        f.source.set_delay("feedA", Duration::from_secs(2));
        f.transport.set_send_delay(Duration::from_secs(3));

        f.scheduler.start(Registration::new("feedA", "chan1", 60)).await;
        // first cycle is now sending X
        sleep(Duration::from_millis(2_500)).await;
        f.scheduler.start(Registration::new("feedA", "chan1", 30)).await;

        sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(f.transport.sent_to("chan1"), vec!["**feedA**\nhttp://x".to_string()]);
        // the replacement fetched only once the old send had been recorded
        assert_eq!(
            f.source.call_offsets("feedA"),
            vec![Duration::ZERO, Duration::from_secs(5)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_ticks() {
        let f = fixture();
        f.scheduler.start(Registration::new("feedA", "chan1", 15)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 1);

        assert!(f.scheduler.stop("chan1").await);
        assert!(!f.scheduler.stop("chan1").await);
        assert_eq!(f.scheduler.state("chan1").await, TimerState::Stopped);

        sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_on_one_destination_does_not_delay_another() {
        let f = fixture();
        f.source.fail("broken", FetchError::Request("connection refused".to_string()));
        f.source.set_delay("broken", Duration::from_secs(10));
        f.source.set_items("healthy", &[("X", "http://x")]);

        f.scheduler.start(Registration::new("broken", "chan1", 15)).await;
        f.scheduler.start(Registration::new("healthy", "chan2", 15)).await;

        settle().await;
        sleep(Duration::from_secs(150)).await;
        settle().await;

        // 0s, 15s, ..., 150s
        assert_eq!(f.source.calls("healthy"), 11);
        let times = f.source.call_offsets("healthy");
        for (n, offset) in times.iter().enumerate() {
            assert_eq!(*offset, Duration::from_secs(15 * n as u64));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_after_failure() {
        let f = fixture();
        f.source.fail("feedA", FetchError::Status(500));
        f.scheduler.start(Registration::new("feedA", "chan1", 60)).await;

        settle().await;
        assert_eq!(f.source.calls("feedA"), 1);

        // The failed tick sleeps 1s before the next tick is due at 60s.
        sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(f.source.calls("feedA"), 2);
        assert_eq!(f.scheduler.state("chan1").await, TimerState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_follows_store() {
        let f = fixture();
        let store = RegistrationStore::new(10, 60);
        store.upsert(Registration::new("feedA", "chan1", 15)).await;

        assert_eq!(f.scheduler.reconcile("chan1", &store).await, TimerState::Running);
        let id = f.scheduler.timer_id("chan1").await;

        // Same revision: nothing restarts.
        f.scheduler.reconcile("chan1", &store).await;
        assert_eq!(f.scheduler.timer_id("chan1").await, id);

        store.set_active("chan1", false).await;
        assert_eq!(f.scheduler.reconcile("chan1", &store).await, TimerState::Stopped);
        assert!(!f.scheduler.is_running("chan1").await);

        store.set_active("chan1", true).await;
        f.scheduler.reconcile("chan1", &store).await;
        assert_eq!(
            f.scheduler.scheduled("chan1").await.map(|r| r.interval_secs),
            Some(15)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let f = fixture();
        f.scheduler.start(Registration::new("feedA", "chan1", 15)).await;
        f.scheduler.start(Registration::new("feedB", "chan2", 15)).await;
        assert_eq!(f.scheduler.running_destinations().await, vec!["chan1", "chan2"]);

        f.scheduler.stop_all().await;
        assert_eq!(f.scheduler.running_count().await, 0);
    }

    #[test]
    fn test_stop_token() {
        assert!(!StopToken::never().is_stopped());
        assert!(StopToken::stopped().is_stopped());

        let (tx, token) = StopToken::pair();
        assert!(!token.is_stopped());
        tx.send(true).unwrap();
        assert!(token.is_stopped());

        let (tx, token) = StopToken::pair();
        drop(tx);
        assert!(token.is_stopped());
    }
}
