//! Key cache configuration.
//!
//! [`KeyCacheConfig`] carries the injected collaborators (clock, key
//! identifier mapping) and the tunables. [`KeyCacheSettings`] is the
//! serializable subset that can be loaded from a config file.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rotakey_cache::KeyCacheConfig;
//!
//! let config = KeyCacheConfig::builder()
//!     .refresh_interval(Duration::from_secs(300))
//!     .build()?;
//! assert_eq!(config.refresh_interval(), Duration::from_secs(300));
//! # Ok::<(), rotakey_cache::ConfigError>(())
//! ```

use std::{fmt, sync::Arc, time::Duration};

use rotakey_storage::CryptoKey;
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, SystemClock},
    error::ConfigError,
};

/// Fallback refresh interval (10 minutes).
///
/// Used when no cached key has a `deletes_at`, and as the retry cadence of
/// the background scheduler.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Smallest accepted refresh interval.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Maps a key generation to the identifier callers use to look it up.
///
/// Must be deterministic and injective over sequences within a feature.
pub type KeyIdFn = Arc<dyn Fn(&CryptoKey) -> String + Send + Sync>;

/// Default key identifier: the decimal sequence number.
#[must_use]
pub fn sequence_key_id(key: &CryptoKey) -> String {
    key.sequence.to_string()
}

/// Configuration for a key cache.
///
/// # Validation
///
/// - `refresh_interval` must be `>=` [`MIN_REFRESH_INTERVAL`]
#[derive(Clone)]
pub struct KeyCacheConfig {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) refresh_interval: Duration,
    pub(crate) key_id: KeyIdFn,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            key_id: Arc::new(sequence_key_id),
        }
    }
}

#[bon::bon]
impl KeyCacheConfig {
    /// Creates a new key cache configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `refresh_interval` is below
    /// [`MIN_REFRESH_INTERVAL`].
    #[builder]
    pub fn new(
        #[builder(default = Arc::new(SystemClock) as Arc<dyn Clock>)] clock: Arc<dyn Clock>,
        #[builder(default = DEFAULT_REFRESH_INTERVAL)] refresh_interval: Duration,
        #[builder(default = Arc::new(sequence_key_id) as KeyIdFn)] key_id: KeyIdFn,
    ) -> Result<Self, ConfigError> {
        if refresh_interval < MIN_REFRESH_INTERVAL {
            return Err(ConfigError::BelowMinimum {
                field: "refresh_interval",
                min: format!("{MIN_REFRESH_INTERVAL:?}"),
                value: format!("{refresh_interval:?}"),
            });
        }
        Ok(Self { clock, refresh_interval, key_id })
    }

    /// Builds a configuration from loaded settings and an injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the settings fail validation.
    pub fn from_settings(
        settings: &KeyCacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        Self::builder().clock(clock).refresh_interval(settings.refresh_interval).build()
    }

    /// Returns the fallback refresh interval.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

impl fmt::Debug for KeyCacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCacheConfig")
            .field("clock", &self.clock)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// Serializable key cache settings.
///
/// Durations use humantime notation (`"10m"`, `"90s"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyCacheSettings {
    /// Fallback refresh interval.
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    pub refresh_interval: Duration,
}

impl Default for KeyCacheSettings {
    fn default() -> Self {
        Self { refresh_interval: DEFAULT_REFRESH_INTERVAL }
    }
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}
