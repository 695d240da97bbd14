//! Key selection over a snapshot.
//!
//! A [`Snapshot`] is the decoded form of one fetch result. Selection is pure:
//! it reads the snapshot and a timestamp and never touches the cache state.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rotakey_storage::{CryptoKey, Zeroizing};

use crate::{
    config::KeyIdFn,
    error::{KeyCacheError, Result},
};

/// Decoded secret bytes, zeroized when the last reference drops.
pub type Secret = Arc<Zeroizing<Vec<u8>>>;

/// A fetched key with its identifier derived and its secret decoded.
#[derive(Clone)]
pub(crate) struct CachedKey {
    pub(crate) id: String,
    pub(crate) sequence: i32,
    pub(crate) starts_at: DateTime<Utc>,
    pub(crate) deletes_at: Option<DateTime<Utc>>,
    pub(crate) secret: Secret,
}

impl CachedKey {
    fn is_retired(&self, now: DateTime<Utc>) -> bool {
        self.deletes_at.is_some_and(|deletes_at| deletes_at <= now)
    }
}

/// The full key set of one feature as last fetched.
#[derive(Clone, Default)]
pub(crate) struct Snapshot {
    keys: Vec<CachedKey>,
}

impl Snapshot {
    /// Decodes a fetch result.
    ///
    /// A single malformed secret rejects the whole set so a partially
    /// decoded snapshot is never installed.
    pub(crate) fn decode(keys: &[CryptoKey], key_id: &KeyIdFn) -> Result<Self> {
        let keys = keys
            .iter()
            .map(|key| {
                let secret = key.decode_secret().map_err(|err| KeyCacheError::InvalidSecret {
                    sequence: key.sequence,
                    message: err.to_string(),
                })?;
                Ok(CachedKey {
                    id: key_id(key),
                    sequence: key.sequence,
                    starts_at: key.starts_at,
                    deletes_at: key.deletes_at,
                    secret: Arc::new(secret),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { keys })
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Picks the newest key that may sign at `now`.
    pub(crate) fn signing(&self, now: DateTime<Utc>) -> Option<&CachedKey> {
        self.keys
            .iter()
            .filter(|key| key.starts_at <= now && !key.is_retired(now))
            .max_by_key(|key| key.sequence)
    }

    /// Resolves a key by identifier for verification at `now`.
    ///
    /// Only [`KeyCacheError::KeyNotFound`] is worth a refresh. A retired or
    /// not-yet-active key is a terminal answer.
    pub(crate) fn verifying(&self, kid: &str, now: DateTime<Utc>) -> Result<&CachedKey> {
        let key = self
            .keys
            .iter()
            .find(|key| key.id == kid)
            .ok_or_else(|| KeyCacheError::key_not_found(kid))?;
        if key.is_retired(now) {
            return Err(KeyCacheError::key_invalid(kid));
        }
        if key.starts_at > now {
            return Err(KeyCacheError::key_not_yet_valid(kid));
        }
        Ok(key)
    }

    /// Time until the soonest upcoming retirement, or `fallback` if no key
    /// retires in the future.
    ///
    /// Keys that have already retired are skipped instead of forcing the
    /// whole result to `fallback`.
    pub(crate) fn next_refresh_delay(&self, now: DateTime<Utc>, fallback: Duration) -> Duration {
        self.keys
            .iter()
            .filter_map(|key| key.deletes_at)
            .filter_map(|deletes_at| (deletes_at - now).to_std().ok())
            .filter(|delay| !delay.is_zero())
            .min()
            .unwrap_or(fallback)
    }
}
