//! Shared test utilities for crypto key testing.
//!
//! This module provides helpers for generating random secrets and building
//! [`CryptoKey`] instances. It is feature-gated behind `testutil` to prevent
//! leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! rotakey-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use rotakey_storage::testutil::{crypto_key, generate_secret};
//! ```

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::key::{CryptoKey, CryptoKeyFeature};

/// Generates `size` random bytes and returns them hex-encoded.
#[must_use]
pub fn generate_secret(size: usize) -> String {
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Decodes a key's hex secret.
///
/// # Panics
///
/// Panics if the secret is not valid hex.
#[must_use]
pub fn decoded_secret(key: &CryptoKey) -> Vec<u8> {
    key.decode_secret().expect("test key secret must be valid hex").to_vec()
}

/// Builds a key with a fresh 64-byte secret.
#[must_use]
pub fn crypto_key(
    feature: CryptoKeyFeature,
    sequence: i32,
    starts_at: DateTime<Utc>,
    deletes_at: Option<DateTime<Utc>>,
) -> CryptoKey {
    CryptoKey::builder()
        .feature(feature)
        .secret(generate_secret(64))
        .sequence(sequence)
        .starts_at(starts_at)
        .maybe_deletes_at(deletes_at)
        .build()
}

/// Builds a key that has been signing-eligible since `now` and never retires.
#[must_use]
pub fn active_key(feature: CryptoKeyFeature, sequence: i32, now: DateTime<Utc>) -> CryptoKey {
    crypto_key(feature, sequence, now, None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_is_hex_of_requested_size() {
        let secret = generate_secret(32);
        assert_eq!(secret.len(), 64);
        assert_eq!(hex::decode(&secret).expect("hex").len(), 32);
        assert_ne!(secret, generate_secret(32));
    }

    #[test]
    fn test_crypto_key_round_trips_secret() {
        let now = Utc::now();
        let key = crypto_key(CryptoKeyFeature::TailnetResume, 5, now, None);
        assert_eq!(decoded_secret(&key).len(), 64);
        assert_eq!(key.sequence, 5);
        assert_eq!(key.starts_at, now);
    }
}
