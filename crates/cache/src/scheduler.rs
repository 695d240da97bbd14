//! Background refresh scheduler.
//!
//! One task per cache sleeps until the soonest key retirement in the current
//! snapshot, then refreshes through the single-flight coordinator. Every
//! snapshot install re-arms the timer, whichever path installed it, and a
//! failed refresh re-arms against the unchanged snapshot.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{engine::Inner, error::KeyCacheError, refresh::RefreshTrigger};

pub(crate) fn spawn(inner: Arc<Inner>) -> JoinHandle<()> {
    tokio::spawn(run(inner))
}

async fn run(inner: Arc<Inner>) {
    let mut installed = inner.installed.subscribe();
    let clock = Arc::clone(&inner.config.clock);

    loop {
        let generation = *installed.borrow_and_update();
        let delay = {
            let state = inner.state.read();
            state.snapshot.next_refresh_delay(clock.now(), inner.config.refresh_interval)
        };
        tracing::debug!(generation, delay = ?delay, "refresh armed");

        tokio::select! {
            biased;
            () = inner.shutdown.cancelled() => break,
            changed = installed.changed() => {
                if changed.is_err() {
                    break;
                }
            },
            () = clock.sleep(delay) => {
                inner.metrics.record_scheduled_refresh();
                let outcome = tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    outcome = inner.refresh(generation, RefreshTrigger::Scheduled) => outcome,
                };
                match outcome {
                    Ok(()) => {},
                    Err(KeyCacheError::Closed) => break,
                    Err(err) => {
                        tracing::warn!(
                            feature = %inner.feature,
                            error = %err,
                            "background key refresh failed, retrying on next timer"
                        );
                    },
                }
            },
        }
    }

    tracing::info!(feature = %inner.feature, "refresh scheduler shutting down");
}
