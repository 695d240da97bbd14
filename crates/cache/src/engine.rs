//! Cache engine shared by the purpose-specific caches.
//!
//! # Lock Discipline
//!
//! The snapshot, its generation, the closed flag and the in-flight marker
//! live behind one [`parking_lot::RwLock`]. Lookups take a short read
//! section, snapshot installation and closing take a short write section.
//! No guard is held across an `.await`, so a slow fetch never blocks reads.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use rotakey_storage::CryptoKeyFeature;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::KeyCacheConfig,
    error::{KeyCacheError, Result},
    fetcher::Fetcher,
    metrics::{CacheMetrics, CacheMetricsSnapshot},
    refresh::{Pending, RefreshTrigger},
    scheduler,
    selector::{Secret, Snapshot},
};

pub(crate) struct State {
    pub(crate) snapshot: Snapshot,
    /// Bumped on every installed snapshot.
    pub(crate) generation: u64,
    pub(crate) closed: bool,
    pub(crate) in_flight: Option<Pending>,
}

/// State shared between the engine, the refresh tasks and the scheduler.
pub(crate) struct Inner {
    pub(crate) feature: CryptoKeyFeature,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) config: KeyCacheConfig,
    pub(crate) state: RwLock<State>,
    /// Announces each installed generation to the scheduler.
    pub(crate) installed: watch::Sender<u64>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) metrics: CacheMetrics,
}

impl Inner {
    fn read_open(&self) -> Result<RwLockReadGuard<'_, State>> {
        let state = self.state.read();
        if state.closed {
            return Err(KeyCacheError::Closed);
        }
        Ok(state)
    }
}

/// The key the cache currently signs or encrypts with.
#[derive(Clone)]
pub struct CurrentKey {
    /// Identifier to embed alongside the signature or ciphertext.
    pub id: String,
    /// Decoded secret bytes.
    pub secret: Secret,
}

impl std::fmt::Debug for CurrentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentKey").field("id", &self.id).field("secret", &"[REDACTED]").finish()
    }
}

pub(crate) struct KeyCache {
    inner: Arc<Inner>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl KeyCache {
    /// Performs the construction fetch and starts the scheduler.
    pub(crate) async fn start(
        fetcher: Arc<dyn Fetcher>,
        feature: CryptoKeyFeature,
        config: KeyCacheConfig,
    ) -> Result<Self> {
        let (installed, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            feature,
            fetcher,
            config,
            state: RwLock::new(State {
                snapshot: Snapshot::default(),
                generation: 0,
                closed: false,
                in_flight: None,
            }),
            installed,
            shutdown: CancellationToken::new(),
            metrics: CacheMetrics::new(),
        });

        inner.refresh(0, RefreshTrigger::Initial).await?;
        let handle = scheduler::spawn(Arc::clone(&inner));
        tracing::debug!(%feature, "key cache started");

        Ok(Self { inner, scheduler: Mutex::new(Some(handle)) })
    }

    pub(crate) fn feature(&self) -> CryptoKeyFeature {
        self.inner.feature
    }

    pub(crate) fn metrics(&self) -> CacheMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub(crate) async fn current_key(&self) -> Result<CurrentKey> {
        let observed = {
            let state = self.inner.read_open()?;
            if let Some(key) = state.snapshot.signing(self.inner.config.clock.now()) {
                self.inner.metrics.record_hit();
                tracing::debug!(cache = "snapshot", kid = %key.id, "cache hit");
                return Ok(CurrentKey { id: key.id.clone(), secret: Arc::clone(&key.secret) });
            }
            state.generation
        };
        self.inner.metrics.record_miss();
        tracing::debug!(cache = "snapshot", "cache miss");

        self.inner.refresh(observed, RefreshTrigger::OnDemand).await?;

        let state = self.inner.read_open()?;
        state
            .snapshot
            .signing(self.inner.config.clock.now())
            .map(|key| CurrentKey { id: key.id.clone(), secret: Arc::clone(&key.secret) })
            .ok_or_else(KeyCacheError::no_current_key)
    }

    pub(crate) async fn key_by_id(&self, kid: &str) -> Result<Secret> {
        let observed = {
            let state = self.inner.read_open()?;
            match state.snapshot.verifying(kid, self.inner.config.clock.now()) {
                Ok(key) => {
                    self.inner.metrics.record_hit();
                    tracing::debug!(cache = "snapshot", "cache hit");
                    return Ok(Arc::clone(&key.secret));
                },
                Err(KeyCacheError::KeyNotFound { .. }) => state.generation,
                Err(err) => return Err(err),
            }
        };
        self.inner.metrics.record_miss();
        tracing::debug!(cache = "snapshot", "cache miss");

        self.inner.refresh(observed, RefreshTrigger::OnDemand).await?;

        let state = self.inner.read_open()?;
        state
            .snapshot
            .verifying(kid, self.inner.config.clock.now())
            .map(|key| Arc::clone(&key.secret))
    }

    /// Stops the scheduler and drops the snapshot.
    ///
    /// Safe to call more than once and concurrently with lookups.
    pub(crate) async fn close(&self) {
        let was_open = {
            let mut state = self.inner.state.write();
            let was_open = !state.closed;
            state.closed = true;
            state.snapshot = Snapshot::default();
            state.in_flight = None;
            was_open
        };
        self.inner.shutdown.cancel();

        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "refresh scheduler panicked");
        }

        if was_open {
            tracing::info!(feature = %self.inner.feature, "key cache closed");
        }
    }
}

impl Drop for KeyCache {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}
