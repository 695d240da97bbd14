//! Rotating cryptographic key cache.
//!
//! Keeps a local view of the keys a remote authority publishes for one
//! feature, and serves the current signing key plus any not-yet-retired key
//! by identifier.
//!
//! # Architecture
//!
//! ```text
//! signing_key / verifying_key
//!         │
//!         ▼
//!   snapshot lookup ──hit──▶ secret
//!         │ miss
//!         ▼
//!   single-flight refresh ◀──── refresh scheduler (sleeps until the
//!         │                      soonest deletes_at, 10m fallback)
//!         ▼
//!      Fetcher ──▶ new snapshot ──▶ scheduler re-armed
//! ```
//!
//! - At most one fetch is in flight per cache. Concurrent misses and the scheduler all wait on
//!   that one fetch.
//! - A lookup refreshes at most once before returning a terminal error.
//! - Background refresh failures are logged and retried on the next timer; on-demand failures
//!   are returned to the caller that triggered them.
//!
//! # Time
//!
//! All time reads and sleeps go through the injected [`Clock`]. Tests use
//! [`testutil::MockClock`] to drive rotation without waiting.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with `MockClock`, `TimerTrap` and `FakeFetcher`.
//! - **`failpoints`**: Enables the `keycache-before-fetch` fail point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod fetcher;
pub mod metrics;
mod refresh;
mod scheduler;
mod selector;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

pub use cache::{EncryptionKeyCache, SigningKeyCache};
pub use clock::{Clock, SystemClock};
pub use config::{
    DEFAULT_REFRESH_INTERVAL, KeyCacheConfig, KeyCacheSettings, KeyIdFn, MIN_REFRESH_INTERVAL,
    sequence_key_id,
};
pub use engine::CurrentKey;
pub use error::{ConfigError, KeyCacheError, Result};
pub use fetcher::{Fetcher, StoreFetcher};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use selector::Secret;
