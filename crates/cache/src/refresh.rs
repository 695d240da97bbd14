//! Single-flight refresh.
//!
//! At most one fetch runs per cache at any time. The first refresh request
//! publishes a pending outcome in the shared state and spawns the fetch;
//! every later request attaches to that pending outcome until it resolves.
//!
//! The fetch runs on its own task, so a caller that stops waiting does not
//! cancel it. The snapshot is replaced and the in-flight marker cleared in
//! the same write section, and only then is the outcome published.

use std::{fmt, sync::Arc};

use fail::fail_point;
use rotakey_storage::StorageError;
use tokio::sync::watch;

use crate::{
    engine::Inner,
    error::{KeyCacheError, Result},
    selector::Snapshot,
};

/// Resolved outcome of one fetch, shared with every waiter.
pub(crate) type Pending = watch::Receiver<Option<Result<()>>>;

/// What asked for a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefreshTrigger {
    /// The construction fetch.
    Initial,
    /// A lookup missed.
    OnDemand,
    /// The background scheduler fired.
    Scheduled,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => f.write_str("initial"),
            Self::OnDemand => f.write_str("on_demand"),
            Self::Scheduled => f.write_str("scheduled"),
        }
    }
}

impl Inner {
    /// Brings the snapshot past `observed` and returns once that happened.
    ///
    /// `observed` is the generation the caller last looked at. If a newer
    /// snapshot is already installed the call returns immediately, if a
    /// fetch is in flight the call joins it, otherwise it starts one.
    pub(crate) async fn refresh(
        self: &Arc<Self>,
        observed: u64,
        trigger: RefreshTrigger,
    ) -> Result<()> {
        let mut pending = {
            let mut state = self.state.write();
            if state.closed {
                return Err(KeyCacheError::Closed);
            }
            let joinable =
                state.in_flight.as_ref().filter(|pending| pending.has_changed().is_ok()).cloned();
            if let Some(pending) = joinable {
                self.metrics.record_joined_refresh();
                tracing::debug!(%trigger, "joining in-flight refresh");
                pending
            } else if state.generation != observed {
                return Ok(());
            } else {
                let (done, pending) = watch::channel(None);
                state.in_flight = Some(pending.clone());
                tokio::spawn(Arc::clone(self).run_fetch(done, trigger));
                pending
            }
        };

        tokio::select! {
            () = self.shutdown.cancelled() => Err(KeyCacheError::Closed),
            outcome = pending.wait_for(Option::is_some) => match outcome {
                Ok(outcome) => (*outcome).clone().unwrap_or(Err(KeyCacheError::Closed)),
                Err(_) => Err(KeyCacheError::Fetch(StorageError::internal(
                    "refresh task ended without an outcome",
                ))),
            },
        }
    }

    async fn run_fetch(
        self: Arc<Self>,
        done: watch::Sender<Option<Result<()>>>,
        trigger: RefreshTrigger,
    ) {
        let fetched = tokio::select! {
            () = self.shutdown.cancelled() => Err(KeyCacheError::Closed),
            fetched = self.fetch_snapshot() => fetched,
        };

        let installed = {
            let mut state = self.state.write();
            state.in_flight = None;
            match fetched {
                _ if state.closed => Err(KeyCacheError::Closed),
                Ok(snapshot) => {
                    let keys = snapshot.len();
                    state.snapshot = snapshot;
                    state.generation += 1;
                    Ok((state.generation, keys))
                },
                Err(err) => Err(err),
            }
        };

        let outcome = match installed {
            Ok((generation, keys)) => {
                self.installed.send_replace(generation);
                tracing::debug!(%trigger, generation, keys, "installed key snapshot");
                Ok(())
            },
            Err(KeyCacheError::Closed) => Err(KeyCacheError::Closed),
            Err(err) => {
                self.metrics.record_fetch_error();
                tracing::debug!(%trigger, error = %err, "key refresh failed");
                Err(err)
            },
        };
        done.send_replace(Some(outcome));
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        fail_point!("keycache-before-fetch", |_| {
            Err(KeyCacheError::Fetch(StorageError::internal("injected failure before fetch")))
        });
        self.metrics.record_fetch();
        let keys = self.fetcher.fetch(self.feature).await?;
        Snapshot::decode(&keys, &self.config.key_id)
    }
}
