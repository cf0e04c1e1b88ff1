// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for key enumeration.

use strata::{CacheHandleConfiguration, CacheManager, ErrorKind};
use strata_tier::testing::{BackendOp, MockBackend};
use tick::Clock;

async fn cache_with(keys: &[&str]) -> (CacheManager<u32>, MockBackend<u32>, MockBackend<u32>) {
    let fast = MockBackend::new();
    let slow = MockBackend::new();
    let cache = CacheManager::builder("keys", Clock::new_frozen())
        .with_handle(CacheHandleConfiguration::new("fast"), fast.clone())
        .with_handle(CacheHandleConfiguration::new("slow"), slow.clone())
        .build()
        .unwrap();
    for key in keys {
        cache.put_value(key, None, 0).await.unwrap();
    }
    (cache, fast, slow)
}

fn sorted(mut keys: Vec<String>) -> Vec<String> {
    keys.sort();
    keys
}

#[tokio::test]
async fn glob_patterns() {
    let keys = ["abc", "abcdef", "xabc", "abx", "a_c", "aXc", "ac", "abbc"];
    let (cache, _, _) = cache_with(&keys).await;

    assert_eq!(sorted(cache.find_keys("abc*", None).await.unwrap()), vec!["abc", "abcdef"]);
    assert_eq!(sorted(cache.find_keys("a?c", None).await.unwrap()), vec!["aXc", "a_c", "abc"]);
    assert_eq!(cache.find_keys("*", None).await.unwrap().len(), keys.len());
    assert_eq!(sorted(cache.find_keys("*abc", None).await.unwrap()), vec!["abc", "xabc"]);
    assert_eq!(sorted(cache.find_keys("a*c", None).await.unwrap()), vec!["aXc", "a_c", "abbc", "abc", "ac"]);
    assert!(cache.find_keys("nothing*", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn keys_come_from_authoritative_handle() {
    let (cache, fast, slow) = cache_with(&["a", "b"]).await;
    fast.clear_operations();

    assert_eq!(sorted(cache.get_all_keys().await.unwrap()), vec!["a", "b"]);

    assert!(fast.operations().is_empty());
    assert!(slow.operations().iter().any(|op| matches!(op, BackendOp::Keys(None))));
}

#[tokio::test]
async fn keys_are_scoped_to_region() {
    let (cache, _, _) = cache_with(&["plain"]).await;
    cache.put_value("scoped", Some("r"), 1).await.unwrap();

    assert_eq!(cache.find_keys("*", Some("r")).await.unwrap(), vec!["scoped"]);
    assert_eq!(cache.get_all_keys().await.unwrap(), vec!["plain"]);
}

#[tokio::test]
async fn falls_back_to_faster_handle_that_enumerates() {
    let fast = MockBackend::new();
    let slow = MockBackend::new().with_key_enumeration(false);
    let cache = CacheManager::<u32>::builder("keys", Clock::new_frozen())
        .with_handle(CacheHandleConfiguration::new("fast"), fast)
        .with_handle(CacheHandleConfiguration::new("slow"), slow)
        .build()
        .unwrap();
    cache.put_value("k", None, 1).await.unwrap();

    assert_eq!(cache.get_all_keys().await.unwrap(), vec!["k"]);
}

#[tokio::test]
async fn no_enumerating_handle_is_an_error() {
    let cache = CacheManager::<u32>::builder("keys", Clock::new_frozen())
        .with_handle(
            CacheHandleConfiguration::new("opaque"),
            MockBackend::new().with_key_enumeration(false),
        )
        .build()
        .unwrap();

    let error = cache.get_all_keys().await.unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Unsupported(_)));
}

#[tokio::test]
async fn empty_pattern_is_rejected() {
    let (cache, _, _) = cache_with(&[]).await;

    assert!(cache.find_keys("", None).await.unwrap_err().is_invalid_argument());
}
