//! The remote key source.

use std::sync::Arc;

use async_trait::async_trait;
use rotakey_storage::{CryptoKey, CryptoKeyFeature, CryptoKeyStore, StorageResult};

/// Returns the full current key set of a feature from the key authority.
///
/// This is the only network operation the cache performs. Implementations
/// must return every key of the feature, since the result replaces the
/// cached snapshot wholesale.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches every key of `feature`.
    async fn fetch(&self, feature: CryptoKeyFeature) -> StorageResult<Vec<CryptoKey>>;
}

/// Adapts a [`CryptoKeyStore`] into a [`Fetcher`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rotakey_cache::{Fetcher, StoreFetcher};
/// use rotakey_storage::{CryptoKeyFeature, MemoryCryptoKeyStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = StoreFetcher::new(Arc::new(MemoryCryptoKeyStore::new()));
/// let keys = fetcher.fetch(CryptoKeyFeature::OidcConvert).await?;
/// assert!(keys.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StoreFetcher<S: ?Sized> {
    store: Arc<S>,
}

impl<S: CryptoKeyStore + ?Sized> StoreFetcher<S> {
    /// Creates a fetcher reading from `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: ?Sized> Clone for StoreFetcher<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

#[async_trait]
impl<S: CryptoKeyStore + ?Sized> Fetcher for StoreFetcher<S> {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, feature: CryptoKeyFeature) -> StorageResult<Vec<CryptoKey>> {
        self.store.list_keys(feature).await
    }
}
