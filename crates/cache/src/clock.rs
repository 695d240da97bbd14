//! Time source for the key cache.
//!
//! Every time read and every sleep in the cache goes through a [`Clock`], so
//! tests can drive key rotation with a virtual clock instead of waiting on
//! wall time. Production code uses [`SystemClock`].

use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A source of the current time and of timers.
#[async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Completes once `duration` has elapsed on this clock.
    ///
    /// Dropping the returned future cancels the timer.
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Utc::now`] and the Tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
