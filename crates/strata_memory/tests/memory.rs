// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `MemoryBackend`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use strata_memory::MemoryBackend;
use strata_tier::{CacheBackend, CacheItem, RemovalReason};
use tokio::time::sleep;

type Removals = Arc<Mutex<Vec<(String, Option<String>, RemovalReason)>>>;

fn record_removals(backend: &MemoryBackend<i32>) -> Removals {
    let removals = Removals::default();
    let sink = Arc::clone(&removals);
    backend.set_removal_listener(Arc::new(move |key, region, reason| {
        sink.lock().push((key.to_string(), region.map(str::to_string), reason));
    }));
    removals
}

#[tokio::test]
async fn add_only_stores_absent_items() {
    let backend = MemoryBackend::<i32>::new();

    assert!(backend.add(CacheItem::new("key", 1).unwrap()).await.unwrap());
    assert!(!backend.add(CacheItem::new("key", 2).unwrap()).await.unwrap());

    let item = backend.get("key", None).await.unwrap().unwrap();
    assert_eq!(*item.value(), 1);
}

#[tokio::test]
async fn put_overwrites() {
    let backend = MemoryBackend::<i32>::new();

    backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();
    backend.put(CacheItem::new("key", 2).unwrap()).await.unwrap();

    assert_eq!(*backend.get("key", None).await.unwrap().unwrap().value(), 2);
}

#[tokio::test]
async fn regions_are_isolated() {
    let backend = MemoryBackend::<i32>::new();

    backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();
    backend.put(CacheItem::in_region("key", "a", 2).unwrap()).await.unwrap();
    backend.put(CacheItem::in_region("other", "a", 3).unwrap()).await.unwrap();
    backend.put(CacheItem::in_region("key", "b", 4).unwrap()).await.unwrap();

    assert_eq!(*backend.get("key", Some("a")).await.unwrap().unwrap().value(), 2);

    backend.clear_region("a").await.unwrap();

    assert!(!backend.exists("key", Some("a")).await.unwrap());
    assert!(!backend.exists("other", Some("a")).await.unwrap());
    assert!(backend.exists("key", None).await.unwrap());
    assert!(backend.exists("key", Some("b")).await.unwrap());
}

#[tokio::test]
async fn remove_reports_presence() {
    let backend = MemoryBackend::<i32>::new();
    backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();

    assert!(backend.remove("key", None).await.unwrap());
    assert!(!backend.remove("key", None).await.unwrap());
}

#[tokio::test]
async fn clear_removes_everything() {
    let backend = MemoryBackend::<i32>::new();
    backend.put(CacheItem::new("a", 1).unwrap()).await.unwrap();
    backend.put(CacheItem::in_region("b", "r", 2).unwrap()).await.unwrap();

    backend.clear().await.unwrap();

    assert!(backend.get("a", None).await.unwrap().is_none());
    assert!(backend.get("b", Some("r")).await.unwrap().is_none());
}

#[tokio::test]
async fn keys_are_listed_per_region() {
    let backend = MemoryBackend::<i32>::new();
    backend.put(CacheItem::new("a", 1).unwrap()).await.unwrap();
    backend.put(CacheItem::new("b", 2).unwrap()).await.unwrap();
    backend.put(CacheItem::in_region("c", "r", 3).unwrap()).await.unwrap();

    let mut keys = backend.keys(None).await.unwrap();
    keys.sort();

    assert!(backend.supports_key_enumeration());
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(backend.keys(Some("r")).await.unwrap(), vec!["c".to_string()]);
}

#[tokio::test]
async fn update_keeps_expiration_and_identity() {
    let backend = MemoryBackend::<i32>::new();
    let item = CacheItem::in_region("key", "r", 1)
        .unwrap()
        .with_sliding_expiration(Duration::from_secs(60))
        .unwrap();
    backend.put(item.clone()).await.unwrap();

    let result = backend.update("key", Some("r"), &|v: &i32| Some(v * 10), 50).await.unwrap();
    let written = result.into_item().unwrap();

    assert_eq!(*written.value(), 10);
    assert_eq!(written.region(), Some("r"));
    assert_eq!(written.expiration_timeout(), Duration::from_secs(60));
    assert_eq!(written.created_utc(), item.created_utc());
}

#[tokio::test]
async fn sliding_expiration_is_refreshed_by_reads() {
    let backend = MemoryBackend::<i32>::new();
    let item = CacheItem::new("key", 1)
        .unwrap()
        .with_sliding_expiration(Duration::from_millis(600))
        .unwrap();
    backend.put(item).await.unwrap();

    sleep(Duration::from_millis(300)).await;
    assert!(backend.get("key", None).await.unwrap().is_some());

    sleep(Duration::from_millis(400)).await;
    assert!(backend.get("key", None).await.unwrap().is_some());

    sleep(Duration::from_millis(900)).await;
    assert!(backend.get("key", None).await.unwrap().is_none());
}

#[tokio::test]
async fn absolute_expiration_ignores_reads() {
    let backend = MemoryBackend::<i32>::new();
    let item = CacheItem::new("key", 1)
        .unwrap()
        .with_absolute_expiration(Duration::from_millis(600))
        .unwrap();
    backend.put(item).await.unwrap();

    sleep(Duration::from_millis(200)).await;
    assert!(backend.get("key", None).await.unwrap().is_some());

    sleep(Duration::from_millis(800)).await;
    assert!(backend.get("key", None).await.unwrap().is_none());
}

#[tokio::test]
async fn expired_items_are_reported() {
    let backend = MemoryBackend::<i32>::new();
    let removals = record_removals(&backend);

    let item = CacheItem::in_region("key", "r", 1)
        .unwrap()
        .with_absolute_expiration(Duration::from_millis(50))
        .unwrap();
    backend.put(item).await.unwrap();

    // Expiration notifications are driven by moka's timer wheel, which ticks about once
    // a second.
    sleep(Duration::from_millis(1_300)).await;
    backend.run_pending_tasks().await;

    assert_eq!(
        *removals.lock(),
        vec![("key".to_string(), Some("r".to_string()), RemovalReason::Expired)]
    );
}

#[tokio::test]
async fn explicit_removal_is_not_reported() {
    let backend = MemoryBackend::<i32>::new();
    let removals = record_removals(&backend);

    backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();
    backend.put(CacheItem::new("key", 2).unwrap()).await.unwrap();
    backend.remove("key", None).await.unwrap();
    backend.run_pending_tasks().await;

    assert!(removals.lock().is_empty());
}

#[tokio::test]
async fn capacity_is_bounded() {
    let backend = MemoryBackend::<i32>::with_capacity(1);

    for i in 0..5 {
        backend.put(CacheItem::new(format!("key{i}"), i).unwrap()).await.unwrap();
    }
    backend.run_pending_tasks().await;

    assert!(backend.len().unwrap() <= 1);
}

#[tokio::test]
async fn clones_share_storage() {
    let backend = MemoryBackend::<i32>::builder().name("shared").build();
    let clone = backend.clone();

    backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();

    assert!(clone.exists("key", None).await.unwrap());
    assert!(format!("{clone:?}").contains("shared"));
}
