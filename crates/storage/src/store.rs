//! Storage trait for crypto key generations.
//!
//! This module provides the [`CryptoKeyStore`] trait that abstracts the
//! authority's persistent key table. Implementations can use different
//! backends (a database for production, in-memory for testing).
//!
//! # Key Lifecycle
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Inserted   │────►│   Signing   │────►│  Retiring   │────►│   Deleted   │
//! │ (starts_at  │     │  (latest    │     │ (deletes_at │     │ (removed    │
//! │  in future) │     │  sequence)  │     │    set)     │     │ from store) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use rotakey_storage::{CryptoKey, CryptoKeyFeature, CryptoKeyStore, MemoryCryptoKeyStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryCryptoKeyStore::new();
//!     let key = CryptoKey::builder()
//!         .feature(CryptoKeyFeature::OidcConvert)
//!         .secret("a1b2".to_owned())
//!         .sequence(1)
//!         .build();
//!
//!     store.insert_key(&key).await?;
//!
//!     let keys = store.list_keys(CryptoKeyFeature::OidcConvert).await?;
//!     assert_eq!(keys.len(), 1);
//!     Ok(())
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    key::{CryptoKey, CryptoKeyFeature},
};

/// Persistence layer for crypto key generations.
///
/// Abstracts key storage so production and testing can share the same
/// interface. Keys are addressed by `(feature, sequence)`.
#[async_trait]
pub trait CryptoKeyStore: Send + Sync {
    /// Stores a new key generation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The key fails [`CryptoKey::validate`] ([`StorageError::Serialization`])
    /// - A key with the same feature and sequence exists ([`StorageError::Conflict`])
    /// - The storage backend is unavailable
    async fn insert_key(&self, key: &CryptoKey) -> StorageResult<()>;

    /// Retrieves a key generation.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(key))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    async fn get_key(
        &self,
        feature: CryptoKeyFeature,
        sequence: i32,
    ) -> StorageResult<Option<CryptoKey>>;

    /// Lists every stored generation of a feature, newest sequence first.
    ///
    /// Retired keys are included until they are deleted; the consumer decides
    /// what is usable at its own notion of "now".
    async fn list_keys(&self, feature: CryptoKeyFeature) -> StorageResult<Vec<CryptoKey>>;

    /// Schedules a key for retirement at `deletes_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the key doesn't exist, or
    /// [`StorageError::Serialization`] if `deletes_at` is not after the key's
    /// `starts_at`.
    async fn retire_key(
        &self,
        feature: CryptoKeyFeature,
        sequence: i32,
        deletes_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Removes a key generation permanently.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the key doesn't exist.
    async fn delete_key(&self, feature: CryptoKeyFeature, sequence: i32) -> StorageResult<()>;
}

/// In-memory implementation of [`CryptoKeyStore`] for testing.
///
/// # Thread Safety
///
/// Uses [`parking_lot::RwLock`] for efficient concurrent access with
/// reader-writer semantics. Clones share the same underlying map.
#[derive(Debug, Default, Clone)]
pub struct MemoryCryptoKeyStore {
    /// Keys indexed by (feature, sequence).
    keys: Arc<RwLock<HashMap<(CryptoKeyFeature, i32), CryptoKey>>>,
}

impl MemoryCryptoKeyStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored keys across all features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    /// Returns `true` if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

fn display_key(feature: CryptoKeyFeature, sequence: i32) -> String {
    format!("{feature}/{sequence}")
}

#[async_trait]
impl CryptoKeyStore for MemoryCryptoKeyStore {
    #[tracing::instrument(skip(self, key), fields(feature = %key.feature, sequence = key.sequence))]
    async fn insert_key(&self, key: &CryptoKey) -> StorageResult<()> {
        key.validate()?;

        let mut keys = self.keys.write();
        match keys.entry((key.feature, key.sequence)) {
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(StorageError::conflict(display_key(key.feature, key.sequence)))
            },
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(key.clone());
                Ok(())
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn get_key(
        &self,
        feature: CryptoKeyFeature,
        sequence: i32,
    ) -> StorageResult<Option<CryptoKey>> {
        Ok(self.keys.read().get(&(feature, sequence)).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn list_keys(&self, feature: CryptoKeyFeature) -> StorageResult<Vec<CryptoKey>> {
        let mut keys: Vec<CryptoKey> = self
            .keys
            .read()
            .values()
            .filter(|key| key.feature == feature)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(keys)
    }

    #[tracing::instrument(skip(self))]
    async fn retire_key(
        &self,
        feature: CryptoKeyFeature,
        sequence: i32,
        deletes_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut keys = self.keys.write();
        let key = keys
            .get_mut(&(feature, sequence))
            .ok_or_else(|| StorageError::not_found(display_key(feature, sequence)))?;

        let mut retired = key.clone();
        retired.deletes_at = Some(deletes_at);
        retired.validate()?;

        *key = retired;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_key(&self, feature: CryptoKeyFeature, sequence: i32) -> StorageResult<()> {
        if self.keys.write().remove(&(feature, sequence)).is_none() {
            return Err(StorageError::not_found(display_key(feature, sequence)));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn make_key(feature: CryptoKeyFeature, sequence: i32) -> CryptoKey {
        CryptoKey::builder()
            .feature(feature)
            .secret("0102".to_owned())
            .sequence(sequence)
            .build()
    }

    #[tokio::test]
    async fn test_insert_and_get_key() {
        let store = MemoryCryptoKeyStore::new();
        let key = make_key(CryptoKeyFeature::TailnetResume, 1);

        store.insert_key(&key).await.expect("insert_key should succeed");

        let retrieved = store
            .get_key(CryptoKeyFeature::TailnetResume, 1)
            .await
            .expect("get_key should succeed")
            .expect("key should exist");
        assert_eq!(retrieved, key);
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let store = MemoryCryptoKeyStore::new();

        let result = store.get_key(CryptoKeyFeature::TailnetResume, 42).await;

        assert!(result.expect("should not error").is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_sequence_fails() {
        let store = MemoryCryptoKeyStore::new();
        let key = make_key(CryptoKeyFeature::OidcConvert, 7);

        store.insert_key(&key).await.expect("first insert should succeed");
        let result = store.insert_key(&key).await;

        assert!(matches!(result, Err(StorageError::Conflict { key }) if key == "oidc_convert/7"));
    }

    #[tokio::test]
    async fn test_same_sequence_different_features() {
        let store = MemoryCryptoKeyStore::new();

        store.insert_key(&make_key(CryptoKeyFeature::OidcConvert, 1)).await.expect("insert");
        store.insert_key(&make_key(CryptoKeyFeature::TailnetResume, 1)).await.expect("insert");

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_window() {
        let store = MemoryCryptoKeyStore::new();
        let now = Utc::now();
        let mut key = make_key(CryptoKeyFeature::TailnetResume, 1);
        key.starts_at = now;
        key.deletes_at = Some(now - Duration::seconds(1));

        let result = store.insert_key(&key).await;

        assert!(matches!(result, Err(StorageError::Serialization { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_keys_filters_feature_and_orders_newest_first() {
        let store = MemoryCryptoKeyStore::new();
        for sequence in [3, 1, 2] {
            store
                .insert_key(&make_key(CryptoKeyFeature::TailnetResume, sequence))
                .await
                .expect("insert");
        }
        store.insert_key(&make_key(CryptoKeyFeature::OidcConvert, 9)).await.expect("insert");

        let keys = store.list_keys(CryptoKeyFeature::TailnetResume).await.expect("list_keys");

        let sequences: Vec<i32> = keys.iter().map(|k| k.sequence).collect();
        assert_eq!(sequences, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_retire_key_sets_deletes_at() {
        let store = MemoryCryptoKeyStore::new();
        let key = make_key(CryptoKeyFeature::TailnetResume, 1);
        store.insert_key(&key).await.expect("insert");

        let deletes_at = key.starts_at + Duration::minutes(10);
        store
            .retire_key(CryptoKeyFeature::TailnetResume, 1, deletes_at)
            .await
            .expect("retire_key should succeed");

        let retired = store
            .get_key(CryptoKeyFeature::TailnetResume, 1)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(retired.deletes_at, Some(deletes_at));
    }

    #[tokio::test]
    async fn test_retire_key_rejects_deletes_before_start() {
        let store = MemoryCryptoKeyStore::new();
        let key = make_key(CryptoKeyFeature::TailnetResume, 1);
        store.insert_key(&key).await.expect("insert");

        let result = store
            .retire_key(CryptoKeyFeature::TailnetResume, 1, key.starts_at - Duration::seconds(1))
            .await;

        assert!(matches!(result, Err(StorageError::Serialization { .. })));
        let unchanged = store
            .get_key(CryptoKeyFeature::TailnetResume, 1)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(unchanged.deletes_at, None);
    }

    #[tokio::test]
    async fn test_retire_missing_key() {
        let store = MemoryCryptoKeyStore::new();

        let result = store.retire_key(CryptoKeyFeature::TailnetResume, 1, Utc::now()).await;

        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_key() {
        let store = MemoryCryptoKeyStore::new();
        store.insert_key(&make_key(CryptoKeyFeature::TailnetResume, 1)).await.expect("insert");

        store.delete_key(CryptoKeyFeature::TailnetResume, 1).await.expect("delete");
        assert!(store.is_empty());

        let result = store.delete_key(CryptoKeyFeature::TailnetResume, 1).await;
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryCryptoKeyStore::new();
        let clone = store.clone();

        clone.insert_key(&make_key(CryptoKeyFeature::OidcConvert, 1)).await.expect("insert");

        assert_eq!(store.len(), 1);
    }
}
