//! Virtual clock and scripted fetcher for key cache tests.
//!
//! Enabled by the `testutil` feature. [`MockClock`] only fires timers when a
//! test advances it, and [`FakeFetcher`] serves a swappable key list while
//! counting calls.
//!
//! ```toml
//! [dev-dependencies]
//! rotakey-cache = { path = "../cache", features = ["testutil"] }
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rotakey_storage::{CryptoKey, CryptoKeyFeature, StorageError, StorageResult};
use tokio::sync::{Notify, oneshot};

use crate::{clock::Clock, fetcher::Fetcher};

// ── MockClock ───────────────────────────────────────────────────────────

struct PendingTimer {
    id: u64,
    deadline: DateTime<Utc>,
    fire: oneshot::Sender<()>,
}

struct ClockState {
    now: DateTime<Utc>,
    next_id: u64,
    timers: Vec<PendingTimer>,
    trap: Option<Arc<TrapState>>,
}

/// A clock that only moves when told to.
///
/// Sleeping registers a timer; [`advance_next`](Self::advance_next) jumps
/// to the earliest deadline and fires that timer. Dropping a sleep future
/// unregisters its timer.
#[derive(Clone)]
pub struct MockClock {
    state: Arc<Mutex<ClockState>>,
    armed: Arc<Notify>,
}

impl std::fmt::Debug for MockClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockClock")
            .field("now", &state.now)
            .field("timers", &state.timers.len())
            .finish()
    }
}

impl Default for MockClock {
    fn default() -> Self {
        // A fixed, whole-second epoch keeps test timestamps reproducible.
        Self::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }
}

impl MockClock {
    /// Creates a clock reading `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClockState {
                now,
                next_id: 0,
                timers: Vec::new(),
                trap: None,
            })),
            armed: Arc::new(Notify::new()),
        }
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }

    /// Number of registered, unfired timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// Earliest deadline among registered timers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.state.lock().timers.iter().map(|timer| timer.deadline).min()
    }

    /// Moves the clock forward without firing anything.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        state.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }

    /// Waits until at least one timer is registered.
    pub async fn wait_for_timer(&self) {
        loop {
            let armed = self.armed.notified();
            tokio::pin!(armed);
            armed.as_mut().enable();
            if !self.state.lock().timers.is_empty() {
                return;
            }
            armed.await;
        }
    }

    /// Waits for a timer, jumps to its deadline and fires it.
    ///
    /// Returns how far the clock moved. If a [`TimerTrap`] is installed the
    /// firing is held by the trap instead of delivered.
    pub async fn advance_next(&self) -> Duration {
        self.wait_for_timer().await;

        let (elapsed, fire, trap) = {
            let mut state = self.state.lock();
            let Some(index) = state
                .timers
                .iter()
                .enumerate()
                .min_by_key(|(_, timer)| timer.deadline)
                .map(|(index, _)| index)
            else {
                return Duration::ZERO;
            };
            let timer = state.timers.remove(index);
            let elapsed = (timer.deadline - state.now).to_std().unwrap_or_default();
            if timer.deadline > state.now {
                state.now = timer.deadline;
            }
            (elapsed, timer.fire, state.trap.clone())
        };

        match trap {
            Some(trap) => trap.hold(fire),
            None => {
                let _ = fire.send(());
            },
        }
        elapsed
    }

    /// Intercepts timer firings until the returned trap is released or
    /// dropped.
    #[must_use]
    pub fn trap(&self) -> TimerTrap {
        let trap = Arc::new(TrapState { held: Mutex::new(Vec::new()), caught: Notify::new() });
        self.state.lock().trap = Some(Arc::clone(&trap));
        TimerTrap { clock: Arc::clone(&self.state), trap }
    }

    fn register(&self, duration: Duration) -> (u64, oneshot::Receiver<()>) {
        let (fire, fired) = oneshot::channel();
        let id = {
            let mut state = self.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            let deadline =
                state.now + chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
            state.timers.push(PendingTimer { id, deadline, fire });
            id
        };
        self.armed.notify_waiters();
        (id, fired)
    }
}

/// Unregisters a timer when its sleep future is dropped.
struct TimerGuard {
    state: Arc<Mutex<ClockState>>,
    id: u64,
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.state.lock().timers.retain(|timer| timer.id != self.id);
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        MockClock::now(self)
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let (id, fired) = self.register(duration);
        let _guard = TimerGuard { state: Arc::clone(&self.state), id };
        // A dropped sender means the clock itself is gone.
        let _ = fired.await;
    }
}

// ── TimerTrap ───────────────────────────────────────────────────────────

struct TrapState {
    held: Mutex<Vec<oneshot::Sender<()>>>,
    caught: Notify,
}

impl TrapState {
    fn hold(&self, fire: oneshot::Sender<()>) {
        self.held.lock().push(fire);
        self.caught.notify_waiters();
    }
}

/// Holds timer firings so a test can act while a timer is "mid-fire".
pub struct TimerTrap {
    clock: Arc<Mutex<ClockState>>,
    trap: Arc<TrapState>,
}

impl TimerTrap {
    /// Waits until the trap holds at least one firing.
    pub async fn wait(&self) {
        loop {
            let caught = self.trap.caught.notified();
            tokio::pin!(caught);
            caught.as_mut().enable();
            if !self.trap.held.lock().is_empty() {
                return;
            }
            caught.await;
        }
    }

    /// Delivers every held firing. Firings whose sleeper has since gone
    /// away are discarded.
    pub fn release(&self) {
        let held = std::mem::take(&mut *self.trap.held.lock());
        for fire in held {
            let _ = fire.send(());
        }
    }
}

impl Drop for TimerTrap {
    fn drop(&mut self) {
        {
            let mut clock = self.clock.lock();
            if clock.trap.as_ref().is_some_and(|trap| Arc::ptr_eq(trap, &self.trap)) {
                clock.trap = None;
            }
        }
        self.release();
    }
}

// ── FakeFetcher ─────────────────────────────────────────────────────────

#[derive(Default)]
struct FetcherState {
    keys: Mutex<Vec<CryptoKey>>,
    failure: Mutex<Option<StorageError>>,
    calls: AtomicUsize,
    called: Notify,
    gated: Mutex<bool>,
    started_notify: Notify,
    gate_notify: Notify,
}

/// In-memory [`Fetcher`] with a call counter.
///
/// Clones share state, so a test can keep a handle while the cache owns
/// another.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Arc<FetcherState>,
}

impl std::fmt::Debug for FakeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeFetcher").field("calls", &self.calls()).finish_non_exhaustive()
    }
}

impl FakeFetcher {
    /// Creates a fetcher serving `keys`.
    #[must_use]
    pub fn new(keys: Vec<CryptoKey>) -> Self {
        let fetcher = Self::default();
        fetcher.set_keys(keys);
        fetcher
    }

    /// Replaces the served key set.
    pub fn set_keys(&self, keys: Vec<CryptoKey>) {
        *self.state.keys.lock() = keys;
    }

    /// Makes every fetch fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<StorageError>) {
        *self.state.failure.lock() = error;
    }

    /// Number of fetches started so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` fetches have started.
    pub async fn wait_for_calls(&self, n: usize) {
        loop {
            let called = self.state.called.notified();
            tokio::pin!(called);
            called.as_mut().enable();
            if self.calls() >= n {
                return;
            }
            called.await;
        }
    }

    /// Makes subsequent fetches block until [`open_gate`](Self::open_gate).
    pub fn enable_gate(&self) {
        *self.state.gated.lock() = true;
    }

    /// Waits until a gated fetch has started.
    pub async fn wait_started(&self) {
        self.state.started_notify.notified().await;
    }

    /// Lets one gated fetch proceed.
    pub fn open_gate(&self) {
        self.state.gate_notify.notify_one();
    }

    /// Stops gating future fetches.
    pub fn disable_gate(&self) {
        *self.state.gated.lock() = false;
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, _feature: CryptoKeyFeature) -> StorageResult<Vec<CryptoKey>> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.state.called.notify_waiters();

        let gated = *self.state.gated.lock();
        if gated {
            self.state.started_notify.notify_one();
            self.state.gate_notify.notified().await;
        }

        if let Some(error) = self.state.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.state.keys.lock().clone())
    }
}
