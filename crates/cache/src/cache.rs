//! Purpose-specific key caches.
//!
//! [`SigningKeyCache`] serves signing features and [`EncryptionKeyCache`]
//! serves encryption features. Both run the same engine, so the refresh,
//! scheduling and shutdown behaviour is identical; only the operation names
//! and the accepted features differ.
//!
//! # Cancellation
//!
//! Every lookup is an ordinary future. Dropping it (for example through
//! [`tokio::time::timeout`]) abandons the wait without cancelling a fetch
//! already in flight; that fetch still installs its snapshot for everyone
//! else.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use rotakey_cache::{KeyCacheConfig, SigningKeyCache, StoreFetcher};
//! use rotakey_storage::{CryptoKey, CryptoKeyFeature, CryptoKeyStore, MemoryCryptoKeyStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryCryptoKeyStore::new());
//! store
//!     .insert_key(
//!         &CryptoKey::builder()
//!             .feature(CryptoKeyFeature::TailnetResume)
//!             .secret("c0ffee".to_owned())
//!             .sequence(1)
//!             .starts_at(Utc::now())
//!             .build(),
//!     )
//!     .await?;
//!
//! let cache = SigningKeyCache::new(
//!     Arc::new(StoreFetcher::new(store)),
//!     CryptoKeyFeature::TailnetResume,
//!     KeyCacheConfig::default(),
//! )
//! .await?;
//!
//! let key = cache.signing_key().await?;
//! let secret = cache.verifying_key(&key.id).await?;
//! assert_eq!(**secret, vec![0xc0, 0xff, 0xee]);
//!
//! cache.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use rotakey_storage::{CryptoKeyFeature, KeyPurpose};

use crate::{
    config::KeyCacheConfig,
    engine::{CurrentKey, KeyCache},
    error::{KeyCacheError, Result},
    fetcher::Fetcher,
    metrics::CacheMetricsSnapshot,
    selector::Secret,
};

fn ensure_purpose(feature: CryptoKeyFeature, expected: KeyPurpose) -> Result<()> {
    if feature.purpose() == expected {
        Ok(())
    } else {
        Err(KeyCacheError::InvalidFeature { feature, expected })
    }
}

/// Cache of the signing keys of one feature.
pub struct SigningKeyCache {
    engine: KeyCache,
}

impl SigningKeyCache {
    /// Creates the cache, fetching the initial key set before returning.
    ///
    /// Must be called within a Tokio runtime; the background refresh
    /// scheduler is spawned onto it.
    ///
    /// # Errors
    ///
    /// - [`KeyCacheError::InvalidFeature`] if `feature` is not a signing feature
    /// - [`KeyCacheError::Fetch`] or [`KeyCacheError::InvalidSecret`] if the initial fetch fails
    pub async fn new(
        fetcher: Arc<dyn Fetcher>,
        feature: CryptoKeyFeature,
        config: KeyCacheConfig,
    ) -> Result<Self> {
        ensure_purpose(feature, KeyPurpose::Signing)?;
        Ok(Self { engine: KeyCache::start(fetcher, feature, config).await? })
    }

    /// Returns the newest key that may sign now.
    ///
    /// On a miss the key set is refreshed once and selection is retried.
    ///
    /// # Errors
    ///
    /// - [`KeyCacheError::KeyNotFound`] if no key may sign, even after a refresh
    /// - [`KeyCacheError::Closed`] if the cache is closed
    /// - [`KeyCacheError::Fetch`] if the refresh this call triggered failed
    #[tracing::instrument(skip(self), fields(feature = %self.engine.feature()))]
    pub async fn signing_key(&self) -> Result<CurrentKey> {
        self.engine.current_key().await
    }

    /// Returns the secret of key `kid` for checking a signature.
    ///
    /// Superseded keys keep verifying until their `deletes_at`.
    ///
    /// # Errors
    ///
    /// - [`KeyCacheError::KeyNotFound`] if `kid` is unknown, even after a refresh
    /// - [`KeyCacheError::KeyInvalid`] if the key is retired
    /// - [`KeyCacheError::KeyNotYetValid`] if the key's `starts_at` is in the future
    /// - [`KeyCacheError::Closed`] if the cache is closed
    #[tracing::instrument(skip(self), fields(feature = %self.engine.feature()))]
    pub async fn verifying_key(&self, kid: &str) -> Result<Secret> {
        self.engine.key_by_id(kid).await
    }

    /// Stops background refresh. Every later lookup fails with
    /// [`KeyCacheError::Closed`].
    pub async fn close(&self) {
        self.engine.close().await;
    }

    /// Returns the feature this cache serves.
    #[must_use]
    pub fn feature(&self) -> CryptoKeyFeature {
        self.engine.feature()
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.engine.metrics()
    }
}

/// Cache of the encryption keys of one feature.
pub struct EncryptionKeyCache {
    engine: KeyCache,
}

impl EncryptionKeyCache {
    /// Creates the cache, fetching the initial key set before returning.
    ///
    /// # Errors
    ///
    /// - [`KeyCacheError::InvalidFeature`] if `feature` is not an encryption feature
    /// - [`KeyCacheError::Fetch`] or [`KeyCacheError::InvalidSecret`] if the initial fetch fails
    pub async fn new(
        fetcher: Arc<dyn Fetcher>,
        feature: CryptoKeyFeature,
        config: KeyCacheConfig,
    ) -> Result<Self> {
        ensure_purpose(feature, KeyPurpose::Encryption)?;
        Ok(Self { engine: KeyCache::start(fetcher, feature, config).await? })
    }

    /// Returns the newest key that may encrypt now.
    ///
    /// # Errors
    ///
    /// Same as [`SigningKeyCache::signing_key`].
    #[tracing::instrument(skip(self), fields(feature = %self.engine.feature()))]
    pub async fn encrypting_key(&self) -> Result<CurrentKey> {
        self.engine.current_key().await
    }

    /// Returns the secret of key `kid` for decrypting a payload.
    ///
    /// # Errors
    ///
    /// Same as [`SigningKeyCache::verifying_key`].
    #[tracing::instrument(skip(self), fields(feature = %self.engine.feature()))]
    pub async fn decrypting_key(&self, kid: &str) -> Result<Secret> {
        self.engine.key_by_id(kid).await
    }

    /// Stops background refresh. Every later lookup fails with
    /// [`KeyCacheError::Closed`].
    pub async fn close(&self) {
        self.engine.close().await;
    }

    /// Returns the feature this cache serves.
    #[must_use]
    pub fn feature(&self) -> CryptoKeyFeature {
        self.engine.feature()
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.engine.metrics()
    }
}

impl std::fmt::Debug for SigningKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyCache").field("feature", &self.feature()).finish_non_exhaustive()
    }
}

impl std::fmt::Debug for EncryptionKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyCache")
            .field("feature", &self.feature())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(CryptoKeyFeature::WorkspaceAppsToken, KeyPurpose::Signing, true)]
    #[case(CryptoKeyFeature::OidcConvert, KeyPurpose::Signing, true)]
    #[case(CryptoKeyFeature::TailnetResume, KeyPurpose::Signing, true)]
    #[case(CryptoKeyFeature::WorkspaceAppsApiKey, KeyPurpose::Signing, false)]
    #[case(CryptoKeyFeature::WorkspaceAppsApiKey, KeyPurpose::Encryption, true)]
    #[case(CryptoKeyFeature::TailnetResume, KeyPurpose::Encryption, false)]
    fn test_ensure_purpose(
        #[case] feature: CryptoKeyFeature,
        #[case] purpose: KeyPurpose,
        #[case] accepted: bool,
    ) {
        let result = ensure_purpose(feature, purpose);
        assert_eq!(result.is_ok(), accepted);
        if let Err(err) = result {
            assert!(matches!(
                err,
                KeyCacheError::InvalidFeature { feature: f, expected } if f == feature && expected == purpose
            ));
        }
    }
}
