#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p rotakey-cache --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use rotakey_cache::{
    KeyCacheConfig, KeyCacheError, SigningKeyCache,
    testutil::{FakeFetcher, MockClock},
};
use rotakey_storage::{CryptoKeyFeature, StorageError, testutil::active_key};

const FEATURE: CryptoKeyFeature = CryptoKeyFeature::WorkspaceAppsToken;

fn config(clock: &MockClock) -> KeyCacheConfig {
    KeyCacheConfig::builder().clock(Arc::new(clock.clone())).build().expect("valid config")
}

#[tokio::test]
async fn fetch_failpoint_fails_construction() {
    let scenario = fail::FailScenario::setup();
    fail::cfg("keycache-before-fetch", "return").expect("failed to configure fail point");

    let clock = MockClock::default();
    let fetcher = FakeFetcher::new(vec![active_key(FEATURE, 1, clock.now())]);
    let result = SigningKeyCache::new(Arc::new(fetcher.clone()), FEATURE, config(&clock)).await;

    assert!(
        matches!(result, Err(KeyCacheError::Fetch(StorageError::Internal { .. }))),
        "construction should fail when the fail point is active"
    );
    assert_eq!(fetcher.calls(), 0, "fetcher must not be reached");

    scenario.teardown();
}

#[tokio::test]
async fn fetch_failpoint_surfaces_on_demand_and_keeps_snapshot() {
    let scenario = fail::FailScenario::setup();

    let clock = MockClock::default();
    let fetcher = FakeFetcher::new(vec![active_key(FEATURE, 1, clock.now())]);
    let cache = SigningKeyCache::new(Arc::new(fetcher.clone()), FEATURE, config(&clock))
        .await
        .expect("cache should start");

    fail::cfg("keycache-before-fetch", "return").expect("failed to configure fail point");
    let result = cache.verifying_key("2").await;
    assert!(
        matches!(result, Err(KeyCacheError::Fetch(_))),
        "on-demand refresh should surface the injected failure"
    );
    fail::remove("keycache-before-fetch");

    let key = cache.signing_key().await.expect("snapshot survives a failed refresh");
    assert_eq!(key.id, "1");
    assert_eq!(cache.metrics().fetch_errors, 1);

    scenario.teardown();
}

#[tokio::test]
async fn fetch_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    // No fail point configured, so construction should succeed normally

    let clock = MockClock::default();
    let fetcher = FakeFetcher::new(vec![active_key(FEATURE, 1, clock.now())]);
    let result = SigningKeyCache::new(Arc::new(fetcher), FEATURE, config(&clock)).await;

    assert!(result.is_ok(), "construction should succeed without fail point");

    scenario.teardown();
}
