// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for managers kept consistent through a backplane.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use strata::{
    Backplane, BackplaneAction, BackplaneHandler, BackplaneMessage, CacheEvent, CacheHandleConfiguration, CacheManager,
    ChangeAction, EventOrigin, InProcessBus, MemoryBackend, Result,
};
use strata_tier::testing::{BackendOp, MockBackend};
use tick::Clock;

struct Peer {
    cache: CacheManager<String>,
    local: MockBackend<String>,
}

fn peer(name: &str, bus: &InProcessBus, shared: &MemoryBackend<String>) -> Peer {
    let local = MockBackend::new();
    let cache = CacheManager::builder(name, Clock::new_frozen())
        .with_handle(CacheHandleConfiguration::new("local"), local.clone())
        .with_handle(CacheHandleConfiguration::new("shared").as_backplane_source(), shared.clone())
        .with_backplane(bus.backplane_with_identity(name).unwrap())
        .build()
        .unwrap();
    Peer { cache, local }
}

fn peers() -> (Peer, Peer) {
    let bus = InProcessBus::new();
    let shared = MemoryBackend::new();
    (peer("first", &bus, &shared), peer("second", &bus, &shared))
}

#[tokio::test]
async fn remote_change_evicts_local_copy() {
    let (first, second) = peers();
    first.cache.put_value("k", None, "v1".to_string()).await.unwrap();

    assert_eq!(second.cache.get("k", None).await.unwrap(), Some("v1".to_string()));
    assert!(second.local.contains("k", None));

    first.cache.put_value("k", None, "v2".to_string()).await.unwrap();
    assert!(!second.local.contains("k", None));
    assert_eq!(second.cache.get("k", None).await.unwrap(), Some("v2".to_string()));
}

#[tokio::test]
async fn remote_update_evicts_local_copy() {
    let (first, second) = peers();
    first.cache.put_value("k", Some("r"), "a".to_string()).await.unwrap();
    second.cache.get("k", Some("r")).await.unwrap();

    first.cache.update("k", Some("r"), |v| Some(format!("{v}b"))).await.unwrap();

    assert!(!second.local.contains("k", Some("r")));
    assert_eq!(second.cache.get("k", Some("r")).await.unwrap(), Some("ab".to_string()));
}

#[tokio::test]
async fn remote_change_fires_no_local_event() {
    let (first, second) = peers();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    second.cache.subscribe(move |event| sink.lock().push(event.clone()));

    first.cache.put_value("k", None, "v".to_string()).await.unwrap();
    first.cache.add_value("other", None, "v".to_string()).await.unwrap();

    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn remote_remove_and_clears_fire_remote_events() {
    let (first, second) = peers();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    second.cache.subscribe(move |event| sink.lock().push(event.clone()));

    first.cache.put_value("k", None, "v".to_string()).await.unwrap();
    first.cache.remove("k", None).await.unwrap();
    first.cache.clear_region("r").await.unwrap();
    first.cache.clear().await.unwrap();

    assert_eq!(
        *events.lock(),
        vec![
            CacheEvent::Remove {
                key: "k".to_string(),
                region: None,
                origin: EventOrigin::Remote,
            },
            CacheEvent::ClearRegion {
                region: "r".to_string(),
                origin: EventOrigin::Remote,
            },
            CacheEvent::Clear {
                origin: EventOrigin::Remote,
            },
        ]
    );
}

#[tokio::test]
async fn remote_clear_spares_the_source_handle() {
    let bus = InProcessBus::new();
    let shared = MemoryBackend::new();
    let first = peer("first", &bus, &shared);
    let second = peer("second", &bus, &shared);
    second.cache.put_value("k", None, "v".to_string()).await.unwrap();

    let outsider = bus.backplane_with_identity("outsider").unwrap();
    outsider.publish(BackplaneMessage::clear("outsider")).await.unwrap();

    assert!(!first.local.contains("k", None));
    assert!(!second.local.contains("k", None));
    assert_eq!(second.cache.get("k", None).await.unwrap(), Some("v".to_string()));
}

#[tokio::test]
async fn dropped_manager_stops_listening() {
    let bus = InProcessBus::new();
    let shared = MemoryBackend::new();
    let first = peer("first", &bus, &shared);
    let second = peer("second", &bus, &shared);
    second.cache.put_value("k", None, "v1".to_string()).await.unwrap();
    drop(second.cache);

    first.cache.put_value("k", None, "v2".to_string()).await.unwrap();

    assert_eq!(bus.subscriber_count(), 1);
    assert_eq!(second.local.item("k", None).unwrap().value(), "v1");
}

#[tokio::test]
async fn dropped_managers_leave_the_bus() {
    let bus = InProcessBus::new();
    let shared = MemoryBackend::new();
    let survivor = peer("survivor", &bus, &shared);

    for index in 0..100 {
        let transient = peer(&format!("transient-{index}"), &bus, &shared);
        transient.cache.put_value("k", None, index.to_string()).await.unwrap();
    }

    assert_eq!(bus.subscriber_count(), 1);
    survivor.cache.put_value("k", None, "last".to_string()).await.unwrap();
    assert_eq!(survivor.cache.get("k", None).await.unwrap(), Some("last".to_string()));
}

#[tokio::test]
async fn partially_failed_remove_still_reaches_peers() {
    let (first, second) = peers();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    second.cache.on_remove(move |event| sink.lock().push(event.clone()));
    first.cache.put_value("k", None, "v".to_string()).await.unwrap();
    second.cache.get("k", None).await.unwrap();
    first.local.fail_when(|op| matches!(op, BackendOp::Remove { .. }));

    assert!(first.cache.remove("k", None).await.is_err());

    assert!(!second.local.contains("k", None));
    assert_eq!(second.cache.get("k", None).await.unwrap(), None);
    assert_eq!(
        *events.lock(),
        vec![CacheEvent::Remove {
            key: "k".to_string(),
            region: None,
            origin: EventOrigin::Remote,
        }]
    );
}

/// Records every publish together with the state of a local handle at that moment.
struct RecordingBackplane {
    log: Arc<Mutex<Vec<String>>>,
    observed: MockBackend<String>,
}

impl Backplane for RecordingBackplane {
    fn identity(&self) -> String {
        "recorder".to_string()
    }

    async fn publish(&self, message: BackplaneMessage) -> Result<()> {
        let key = message.key().unwrap_or_default().to_string();
        let held = self.observed.contains(&key, message.region());
        self.log.lock().push(format!("publish {} held={held}", message.serialize()));
        Ok(())
    }

    fn subscribe(&self, _handler: BackplaneHandler) {}
}

#[tokio::test]
async fn storage_then_peers_then_listeners() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let local = MockBackend::new();
    let source = MockBackend::new();
    let cache = CacheManager::<String>::builder("ordered", Clock::new_frozen())
        .with_handle(CacheHandleConfiguration::new("local"), local.clone())
        .with_handle(CacheHandleConfiguration::new("source").as_backplane_source(), source)
        .with_backplane(RecordingBackplane {
            log: Arc::clone(&log),
            observed: local.clone(),
        })
        .build()
        .unwrap();
    let sink = Arc::clone(&log);
    cache.subscribe(move |event| sink.lock().push(format!("event {event:?}")));

    cache.put_value("k", None, "v".to_string()).await.unwrap();
    cache.remove("k", None).await.unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 4);
    assert_eq!(log[0], "publish recorder:0:Put:aw== held=true");
    assert!(log[1].starts_with("event Put"));
    assert_eq!(log[2], "publish recorder:1:aw== held=false");
    assert!(log[3].starts_with("event Remove"));
}

#[tokio::test]
async fn partially_failed_remove_publishes_then_fires() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let local = MockBackend::new();
    let source = MockBackend::new();
    let cache = CacheManager::<String>::builder("partial", Clock::new_frozen())
        .with_handle(CacheHandleConfiguration::new("local"), local.clone())
        .with_handle(CacheHandleConfiguration::new("source").as_backplane_source(), source.clone())
        .with_backplane(RecordingBackplane {
            log: Arc::clone(&log),
            observed: local.clone(),
        })
        .build()
        .unwrap();
    cache.put_value("k", None, "v".to_string()).await.unwrap();
    local.fail_when(|op| matches!(op, BackendOp::Remove { .. }));
    let sink = Arc::clone(&log);
    cache.on_remove(move |event| sink.lock().push(format!("event {event:?}")));

    let error = cache.remove("k", None).await.unwrap_err();

    assert!(!error.is_invalid_argument());
    assert!(!source.contains("k", None));
    let log = log.lock();
    assert_eq!(log.len(), 3);
    assert_eq!(log[1], "publish recorder:1:aw== held=true");
    assert!(log[2].starts_with("event Remove"));
}

#[tokio::test]
async fn outbound_messages_carry_change_action() {
    let bus = InProcessBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener = bus.backplane_with_identity("listener").unwrap();
    listener.subscribe(Arc::new(move |message: BackplaneMessage| {
        sink.lock().push((message.action(), message.change_action()));
        async {}.boxed()
    }));

    let shared = MemoryBackend::new();
    let first = peer("first", &bus, &shared);
    first.cache.add_value("k", None, "v".to_string()).await.unwrap();
    first.cache.put_value("k", None, "w".to_string()).await.unwrap();
    first.cache.update("k", None, |v| Some(v.clone())).await.unwrap();
    first.cache.remove("k", None).await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (BackplaneAction::Changed, ChangeAction::Add),
            (BackplaneAction::Changed, ChangeAction::Put),
            (BackplaneAction::Changed, ChangeAction::Update),
            (BackplaneAction::Removed, ChangeAction::Invalid),
        ]
    );
}
