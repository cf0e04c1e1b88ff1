// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory backend implementation using moka.

use std::{
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use moka::{
    Expiry,
    future::Cache,
    notification::RemovalCause,
    ops::compute::{CompResult, Op},
};
use parking_lot::RwLock;
use strata_tier::{
    CacheBackend, CacheItem, Error, ExpirationMode, RemovalListener, RemovalReason, UpdateFn, UpdateItemResult,
};

use crate::builder::MemoryBackendBuilder;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ItemKey {
    key: String,
    region: Option<String>,
}

impl ItemKey {
    fn new(key: &str, region: Option<&str>) -> Self {
        Self {
            key: key.to_owned(),
            region: region.map(str::to_owned),
        }
    }

    fn of<V>(item: &CacheItem<V>) -> Self {
        Self::new(item.key(), item.region())
    }
}

/// Per-item expiration driven by the item's own mode and timeout.
struct ItemExpiry;

impl<V> Expiry<ItemKey, CacheItem<V>> for ItemExpiry {
    fn expire_after_create(&self, _key: &ItemKey, item: &CacheItem<V>, _created_at: Instant) -> Option<Duration> {
        time_to_live(item)
    }

    fn expire_after_read(
        &self,
        _key: &ItemKey,
        item: &CacheItem<V>,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        match item.expiration_mode() {
            ExpirationMode::Sliding => Some(item.expiration_timeout()),
            _ => duration_until_expiry,
        }
    }

    fn expire_after_update(
        &self,
        _key: &ItemKey,
        item: &CacheItem<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        time_to_live(item)
    }
}

/// Storage lifetime counted from the write.
///
/// An absolute item copied in from another tier may outlive its deadline here; the cache
/// that owns the clock stops serving it at the deadline.
fn time_to_live<V>(item: &CacheItem<V>) -> Option<Duration> {
    match item.expiration_mode() {
        ExpirationMode::Sliding | ExpirationMode::Absolute => Some(item.expiration_timeout()),
        ExpirationMode::None | ExpirationMode::Default => None,
    }
}

type ListenerSlot = Arc<RwLock<Option<RemovalListener>>>;

/// An in-memory cache backend backed by moka.
///
/// Items expire individually according to their [`ExpirationMode`]. Clones share the same
/// storage, so one backend can be handed to several cache managers to stand in for a
/// shared remote tier.
///
/// # Examples
///
/// ```
/// use strata_memory::MemoryBackend;
/// use strata_tier::{CacheBackend, CacheItem};
/// # futures::executor::block_on(async {
///
/// let backend = MemoryBackend::<i32>::new();
///
/// assert!(backend.add(CacheItem::new("key", 42)?).await?);
/// assert!(!backend.add(CacheItem::new("key", 7)?).await?);
/// let item = backend.get("key", None).await?;
/// assert_eq!(item.map(|item| *item.value()), Some(42));
/// # Ok::<(), strata_tier::Error>(())
/// # }).unwrap();
/// ```
pub struct MemoryBackend<V> {
    inner: Cache<ItemKey, CacheItem<V>>,
    listener: ListenerSlot,
}

impl<V> Debug for MemoryBackend<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("name", &self.inner.name())
            .field("entry_count", &self.inner.entry_count())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MemoryBackend<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            listener: Arc::clone(&self.listener),
        }
    }
}

impl<V> Default for MemoryBackend<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryBackend<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates an unbounded backend.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a backend that holds at most `max_capacity` items.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::builder().max_capacity(max_capacity).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MemoryBackendBuilder<V> {
        MemoryBackendBuilder::new()
    }

    pub(crate) fn from_builder(builder: &MemoryBackendBuilder<V>) -> Self {
        let listener = ListenerSlot::default();
        let notify = Arc::clone(&listener);

        let mut moka_builder = Cache::<ItemKey, CacheItem<V>>::builder()
            .expire_after(ItemExpiry)
            .eviction_listener(move |key: Arc<ItemKey>, _item: CacheItem<V>, cause: RemovalCause| {
                let reason = match cause {
                    RemovalCause::Expired => RemovalReason::Expired,
                    RemovalCause::Size => RemovalReason::Evicted,
                    RemovalCause::Explicit | RemovalCause::Replaced => return,
                };
                let listener = notify.read().clone();
                if let Some(listener) = listener {
                    listener(&key.key, key.region.as_deref(), reason);
                }
            });

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: moka_builder.build(),
            listener,
        }
    }

    /// Runs pending maintenance such as evicting expired items and delivering their
    /// removal notifications.
    pub async fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl<V> CacheBackend<V> for MemoryBackend<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn add(&self, item: CacheItem<V>) -> Result<bool, Error> {
        let entry = self.inner.entry(ItemKey::of(&item)).or_insert_with(async move { item }).await;
        Ok(entry.is_fresh())
    }

    async fn put(&self, item: CacheItem<V>) -> Result<(), Error> {
        self.inner.insert(ItemKey::of(&item), item).await;
        Ok(())
    }

    async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, Error> {
        Ok(self.inner.get(&ItemKey::new(key, region)).await)
    }

    async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        Ok(self.inner.contains_key(&ItemKey::new(key, region)))
    }

    async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        Ok(self.inner.remove(&ItemKey::new(key, region)).await.is_some())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.invalidate_all();
        Ok(())
    }

    async fn clear_region(&self, region: &str) -> Result<(), Error> {
        let doomed: Vec<Arc<ItemKey>> = self
            .inner
            .iter()
            .filter(|(key, _)| key.region.as_deref() == Some(region))
            .map(|(key, _)| key)
            .collect();
        for key in doomed {
            self.inner.invalidate(key.as_ref()).await;
        }
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        _max_retries: u32,
    ) -> Result<UpdateItemResult<V>, Error> {
        // The compute closure runs under moka's per-key lock, so no conflict can occur.
        let result = self
            .inner
            .entry(ItemKey::new(key, region))
            .and_compute_with(|entry| {
                let op = entry.map_or(Op::Nop, |entry| {
                    let current = entry.into_value();
                    update(current.value()).map_or(Op::Nop, |value| Op::Put(current.with_value(value)))
                });
                std::future::ready(op)
            })
            .await;

        Ok(match result {
            CompResult::ReplacedWith(entry) => UpdateItemResult::success(entry.into_value(), false, 1),
            CompResult::StillNone(_) => UpdateItemResult::item_did_not_exist(),
            CompResult::Unchanged(_) | CompResult::Inserted(_) | CompResult::Removed(_) => {
                UpdateItemResult::factory_returned_null(false, 1)
            }
        })
    }

    async fn keys(&self, region: Option<&str>) -> Result<Vec<String>, Error> {
        Ok(self
            .inner
            .iter()
            .filter(|(key, _)| key.region.as_deref() == region)
            .map(|(key, _)| key.key.clone())
            .collect())
    }

    fn supports_key_enumeration(&self) -> bool {
        true
    }

    fn set_removal_listener(&self, listener: RemovalListener) {
        *self.listener.write() = Some(listener);
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn sliding_items_refresh_on_read() {
        let item = CacheItem::new("key", 1)
            .unwrap()
            .with_sliding_expiration(Duration::from_secs(5))
            .unwrap();
        let now = Instant::now();

        let ttl = ItemExpiry.expire_after_read(
            &ItemKey::of(&item),
            &item,
            now,
            Some(Duration::from_secs(1)),
            now,
        );
        assert_eq!(ttl, Some(Duration::from_secs(5)));
    }

    #[test]
    fn absolute_items_keep_remaining_time_on_read() {
        let item = CacheItem::new("key", 1)
            .unwrap()
            .with_absolute_expiration(Duration::from_secs(5))
            .unwrap();
        let now = Instant::now();

        let ttl = ItemExpiry.expire_after_read(
            &ItemKey::of(&item),
            &item,
            now,
            Some(Duration::from_secs(1)),
            now,
        );
        assert_eq!(ttl, Some(Duration::from_secs(1)));
    }

    #[test]
    fn absolute_items_live_for_their_timeout_from_the_write() {
        let item = CacheItem::new("key", 1)
            .unwrap()
            .with_absolute_expiration(Duration::from_secs(60))
            .unwrap()
            .with_created_utc(std::time::SystemTime::UNIX_EPOCH);

        assert_eq!(time_to_live(&item), Some(Duration::from_secs(60)));
    }

    #[test]
    fn untimed_items_never_expire() {
        let item = CacheItem::new("key", 1).unwrap();

        assert_eq!(time_to_live(&item), None);
        assert_eq!(time_to_live(&item.with_no_expiration()), None);
    }

    #[test]
    fn update_reports_terminal_states() {
        let backend = MemoryBackend::<i32>::new();

        block_on(async {
            let missing = backend.update("key", None, &|v: &i32| Some(v + 1), 50).await.unwrap();
            assert_eq!(missing.state(), strata_tier::UpdateState::ItemDidNotExist);

            backend.put(CacheItem::new("key", 1).unwrap()).await.unwrap();
            let declined = backend.update("key", None, &|_: &i32| None, 50).await.unwrap();
            assert_eq!(declined.state(), strata_tier::UpdateState::FactoryReturnedNull);

            let updated = backend.update("key", None, &|v: &i32| Some(v + 1), 50).await.unwrap();
            assert_eq!(updated.state(), strata_tier::UpdateState::Success);
            assert_eq!(updated.item().map(|item| *item.value()), Some(2));
            assert_eq!(updated.number_of_tries_needed(), 1);
        });
    }
}
