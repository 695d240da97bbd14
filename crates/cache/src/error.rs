//! Key cache error types.
//!
//! This module defines errors that can occur while resolving signing,
//! verifying, encrypting and decrypting keys from the cache.

use rotakey_storage::{CryptoKeyFeature, KeyPurpose, StorageError};
use thiserror::Error;

/// Key cache errors.
///
/// The type is `Clone` so the outcome of one fetch can be handed to every
/// caller that joined it.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`, so new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum KeyCacheError {
    /// No key satisfies the lookup, even after a refresh.
    ///
    /// `kid` is `None` for signing/encrypting lookups, which have no
    /// identifier.
    #[error("Crypto key not found{}", .kid.as_deref().map(|kid| format!(": {kid}")).unwrap_or_default())]
    KeyNotFound {
        /// Identifier that was looked up, if any.
        kid: Option<String>,
    },

    /// The key exists but is past its `deletes_at`.
    #[error("Crypto key is retired: {kid}")]
    KeyInvalid {
        /// Identifier of the retired key.
        kid: String,
    },

    /// The key exists but its `starts_at` is still in the future.
    #[error("Crypto key not yet valid: {kid}")]
    KeyNotYetValid {
        /// Identifier of the key.
        kid: String,
    },

    /// The cache has been closed.
    #[error("Key cache is closed")]
    Closed,

    /// The fetcher failed.
    #[error("Key fetch failed: {0}")]
    Fetch(
        /// The underlying fetch error.
        #[source]
        StorageError,
    ),

    /// A fetched key carries a secret that cannot be decoded.
    #[error("Invalid secret for key sequence {sequence}: {message}")]
    InvalidSecret {
        /// Sequence of the offending key.
        sequence: i32,
        /// Decoding failure description.
        message: String,
    },

    /// The feature's purpose doesn't match the cache type.
    #[error("Feature {feature} is not a {expected} feature")]
    InvalidFeature {
        /// The rejected feature.
        feature: CryptoKeyFeature,
        /// The purpose the cache requires.
        expected: KeyPurpose,
    },

    /// The cache configuration is invalid.
    #[error("Invalid key cache configuration: {0}")]
    Config(
        /// The underlying configuration error.
        #[source]
        ConfigError,
    ),
}

impl KeyCacheError {
    /// Creates a `KeyNotFound` error for an identifier lookup.
    #[must_use]
    pub fn key_not_found(kid: impl Into<String>) -> Self {
        Self::KeyNotFound { kid: Some(kid.into()) }
    }

    /// Creates a `KeyNotFound` error for a signing/encrypting lookup.
    #[must_use]
    pub fn no_current_key() -> Self {
        Self::KeyNotFound { kid: None }
    }

    /// Creates a `KeyInvalid` error.
    #[must_use]
    pub fn key_invalid(kid: impl Into<String>) -> Self {
        Self::KeyInvalid { kid: kid.into() }
    }

    /// Creates a `KeyNotYetValid` error.
    #[must_use]
    pub fn key_not_yet_valid(kid: impl Into<String>) -> Self {
        Self::KeyNotYetValid { kid: kid.into() }
    }
}

impl From<StorageError> for KeyCacheError {
    fn from(err: StorageError) -> Self {
        KeyCacheError::Fetch(err)
    }
}

impl From<ConfigError> for KeyCacheError {
    fn from(err: ConfigError) -> Self {
        KeyCacheError::Config(err)
    }
}

/// Errors raised when validating configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration field is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Minimum allowed value, rendered for display.
        min: String,
        /// Provided value, rendered for display.
        value: String,
    },
}

/// Result type alias for key cache operations.
pub type Result<T> = std::result::Result<T, KeyCacheError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(KeyCacheError::no_current_key().to_string(), "Crypto key not found");
        assert_eq!(KeyCacheError::key_not_found("12").to_string(), "Crypto key not found: 12");
        assert_eq!(KeyCacheError::key_invalid("3").to_string(), "Crypto key is retired: 3");
        assert_eq!(KeyCacheError::key_not_yet_valid("4").to_string(), "Crypto key not yet valid: 4");
        assert_eq!(KeyCacheError::Closed.to_string(), "Key cache is closed");
    }

    #[test]
    fn test_invalid_feature_display() {
        let err = KeyCacheError::InvalidFeature {
            feature: CryptoKeyFeature::WorkspaceAppsApiKey,
            expected: KeyPurpose::Signing,
        };
        assert_eq!(err.to_string(), "Feature workspace_apps_api_key is not a signing feature");
    }

    #[test]
    fn test_fetch_error_preserves_source_chain() {
        let err: KeyCacheError = StorageError::connection("connection refused").into();

        assert_eq!(err.to_string(), "Key fetch failed: Connection error: connection refused");
        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "Connection error: connection refused");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::BelowMinimum {
            field: "refresh_interval",
            min: "1s".into(),
            value: "0ns".into(),
        };
        assert_eq!(err.to_string(), "refresh_interval must be at least 1s, got 0ns");
    }
}
