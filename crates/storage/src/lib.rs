//! Crypto key data model and key store abstraction.
//!
//! This crate provides the [`CryptoKey`] record published by a key authority,
//! the [`CryptoKeyFeature`] families keys belong to, and the
//! [`CryptoKeyStore`] trait that backs the authority's key table.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      rotakey-cache                          │
//! │        SigningKeyCache / EncryptionKeyCache / Fetcher       │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     rotakey-storage                         │
//! │     CryptoKey │ CryptoKeyFeature │ CryptoKeyStore trait     │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  MemoryCryptoKeyStore    │   database-backed store          │
//! │       (testing)          │   (production, out of tree)      │
//! └──────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. Backends should map their
//! internal errors onto the [`StorageError`] variants.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with secret and key generators. Enable this in
//!   `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod key;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use error::{BoxError, StorageError, StorageResult};
pub use key::{CryptoKey, CryptoKeyFeature, KeyPurpose};
pub use store::{CryptoKeyStore, MemoryCryptoKeyStore};
pub use zeroize::Zeroizing;
