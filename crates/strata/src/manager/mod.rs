// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache manager: one cache over an ordered list of handles.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use strata_tier::{CacheItem, Result, ensure_key, ensure_region};
use tick::Clock;

use crate::backplane::{BackplaneMessage, ChangeAction, DynBackplane};
use crate::builder::CacheManagerBuilder;
use crate::config::{CacheManagerConfiguration, UpdateMode};
use crate::events::{CacheEvent, CacheEvents, EventListener, EventOrigin};
use crate::handle::CacheHandle;

mod backplane;
mod keys;
mod update;

/// A multi-tier cache.
///
/// The manager owns an ordered list of [`CacheHandle`]s. Index 0 is the fastest tier and is
/// read first; the last handle is the most authoritative. Reads stop at the first hit and,
/// with [`UpdateMode::Up`], copy the item into every faster handle. Adds and updates start
/// at the authoritative end, and a tier that disagrees gets its copy evicted rather than
/// overwritten.
///
/// With a backplane, every local mutation is announced to peer managers and their
/// announcements evict local copies, except from the backplane source handle which is
/// shared with the peers.
///
/// Clones share the same handles, listeners and backplane.
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use strata::{CacheHandleConfiguration, CacheManager};
/// use tick::Clock;
///
/// # block_on(async {
/// let cache = CacheManager::<String>::builder("users", Clock::new_frozen())
///     .with_memory_handle(CacheHandleConfiguration::new("l1"))
///     .with_memory_handle(CacheHandleConfiguration::new("l2"))
///     .build()?;
///
/// cache.put_value("alice", None, "Alice".to_string()).await?;
/// assert_eq!(cache.get("alice", None).await?, Some("Alice".to_string()));
/// # Ok::<(), strata::Error>(())
/// # }).unwrap();
/// ```
pub struct CacheManager<V> {
    inner: Arc<ManagerInner<V>>,
}

struct ManagerInner<V> {
    config: CacheManagerConfiguration,
    clock: Clock,
    handles: Vec<CacheHandle<V>>,
    backplane: Option<BackplaneLink>,
    events: CacheEvents,
}

struct BackplaneLink {
    backplane: Arc<DynBackplane<'static>>,
    identity: String,
    source: usize,
}

impl<V> Clone for CacheManager<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Debug for CacheManager<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("name", &self.inner.config.name())
            .field("handles", &self.inner.handles)
            .field("backplane", &self.backplane_identity())
            .field("events", &self.inner.events)
            .finish()
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Starts building a manager whose timestamps and expiration follow `clock`.
    #[must_use]
    pub fn builder(name: impl Into<String>, clock: Clock) -> CacheManagerBuilder<V> {
        CacheManagerBuilder::new(name, clock)
    }

    pub(crate) fn from_parts(
        config: CacheManagerConfiguration,
        handles: Vec<CacheHandle<V>>,
        backplane: Option<(Arc<DynBackplane<'static>>, String)>,
        clock: Clock,
    ) -> Self {
        let backplane = backplane
            .zip(config.backplane_source())
            .map(|((backplane, identity), source)| BackplaneLink {
                backplane,
                identity,
                source,
            });

        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                clock,
                handles,
                backplane,
                events: CacheEvents::default(),
            }),
        };
        manager.register_removal_listeners();
        manager.subscribe_to_backplane();
        manager
    }

    fn downgrade(&self) -> Weak<ManagerInner<V>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(inner: &Weak<ManagerInner<V>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Reads an item, filling faster handles from the first handle that holds it.
    ///
    /// Fires [`CacheEvent::Get`] on a hit.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn get_cache_item(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>> {
        ensure_key(key)?;
        ensure_region(region)?;

        for (index, handle) in self.inner.handles.iter().enumerate() {
            let Some(mut item) = handle.get(key, region).await? else {
                continue;
            };

            tracing::trace!(cache.name = self.name(), cache.handle = handle.name(), cache.key = key, "hit");
            item.set_last_accessed_utc(self.inner.clock.system_time());
            self.add_to_handles(&item, index).await;
            self.inner.events.emit(|| CacheEvent::Get {
                key: key.to_owned(),
                region: region.map(str::to_owned),
                origin: EventOrigin::Local,
            });
            return Ok(Some(item));
        }

        tracing::trace!(cache.name = self.name(), cache.key = key, "miss");
        Ok(None)
    }

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// See [`get_cache_item`](Self::get_cache_item).
    pub async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<V>> {
        Ok(self.get_cache_item(key, region).await?.map(CacheItem::into_value))
    }

    /// Returns `true` if any handle holds the key.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool> {
        ensure_key(key)?;
        ensure_region(region)?;

        for handle in &self.inner.handles {
            if handle.exists(key, region).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Adds an item if no handle holds its key.
    ///
    /// Handles are visited from the last to the first. When one of them already holds the
    /// key, the item is evicted from every other handle and `false` is returned. Fires
    /// [`CacheEvent::Add`] when every handle accepted the item.
    ///
    /// # Errors
    ///
    /// Returns the error of a failing handle.
    pub async fn add(&self, item: CacheItem<V>) -> Result<bool> {
        let key = item.key();
        let region = item.region();

        for (index, handle) in self.inner.handles.iter().enumerate().rev() {
            if !handle.add(item.clone()).await? {
                tracing::debug!(cache.name = self.name(), cache.handle = handle.name(), cache.key = key, "add conflict");
                self.evict_from_other_handles(key, region, index).await;
                return Ok(false);
            }
        }

        self.notify(|owner| BackplaneMessage::changed(owner, key, region, ChangeAction::Add))
            .await;
        self.inner.events.emit(|| CacheEvent::Add {
            key: key.to_owned(),
            region: region.map(str::to_owned),
            origin: EventOrigin::Local,
        });
        Ok(true)
    }

    /// Adds a value under `key` if no handle holds it.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn add_value(&self, key: &str, region: Option<&str>, value: V) -> Result<bool> {
        self.add(new_item(key, region, value)?).await
    }

    /// Writes an item to every handle.
    ///
    /// Fires [`CacheEvent::Put`] after peers were notified.
    ///
    /// # Errors
    ///
    /// Returns the error of a failing handle; handles before it keep the new item.
    pub async fn put(&self, item: CacheItem<V>) -> Result<()> {
        for handle in &self.inner.handles {
            handle.put(item.clone()).await?;
        }

        let key = item.key();
        let region = item.region();
        self.notify(|owner| BackplaneMessage::changed(owner, key, region, ChangeAction::Put))
            .await;
        self.inner.events.emit(|| CacheEvent::Put {
            key: key.to_owned(),
            region: region.map(str::to_owned),
            origin: EventOrigin::Local,
        });
        Ok(())
    }

    /// Writes a value under `key` to every handle.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn put_value(&self, key: &str, region: Option<&str>, value: V) -> Result<()> {
        self.put(new_item(key, region, value)?).await
    }

    /// Removes the key from every handle.
    ///
    /// Every handle is asked even if an earlier one failed. Returns `true` if any handle held
    /// the key. Whenever a handle dropped the key, peers are notified and
    /// [`CacheEvent::Remove`] fires, even if another handle failed.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the first error of a
    /// failing handle.
    pub async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool> {
        ensure_key(key)?;
        ensure_region(region)?;

        let mut removed = false;
        let mut failure = None;
        for handle in &self.inner.handles {
            match handle.remove(key, region).await {
                Ok(result) => removed |= result,
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }

        if removed {
            self.notify(|owner| BackplaneMessage::removed(owner, key, region)).await;
            self.inner.events.emit(|| CacheEvent::Remove {
                key: key.to_owned(),
                region: region.map(str::to_owned),
                origin: EventOrigin::Local,
            });
        }
        failure.map_or(Ok(removed), Err)
    }

    /// Removes every item from every handle.
    ///
    /// # Errors
    ///
    /// Returns the error of a failing handle.
    pub async fn clear(&self) -> Result<()> {
        for handle in &self.inner.handles {
            handle.clear().await?;
        }

        self.notify(|owner| BackplaneMessage::clear(owner)).await;
        self.inner.events.emit(|| CacheEvent::Clear { origin: EventOrigin::Local });
        Ok(())
    }

    /// Removes every item in `region` from every handle.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty region, or the error of a failing
    /// handle.
    pub async fn clear_region(&self, region: &str) -> Result<()> {
        ensure_region(Some(region))?;

        for handle in &self.inner.handles {
            handle.clear_region(region).await?;
        }

        self.notify(|owner| BackplaneMessage::clear_region(owner, region)).await;
        self.inner.events.emit(|| CacheEvent::ClearRegion {
            region: region.to_owned(),
            origin: EventOrigin::Local,
        });
        Ok(())
    }

    /// Copies an item found at `found` into the faster handles, per the update mode.
    async fn add_to_handles(&self, item: &CacheItem<V>, found: usize) {
        if self.inner.config.update_mode() == UpdateMode::None {
            return;
        }

        for handle in self.inner.handles.iter().take(found) {
            match handle.add(item.clone()).await {
                Ok(true) => {
                    tracing::trace!(cache.name = self.name(), cache.handle = handle.name(), cache.key = item.key(), "backfilled");
                }
                // Someone else populated the handle first.
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(cache.name = self.name(), cache.handle = handle.name(), cache.key = item.key(), %error, "backfill failed");
                }
            }
        }
    }

    async fn evict_from_other_handles(&self, key: &str, region: Option<&str>, keep: usize) {
        self.evict_where(key, region, |index| index != keep).await;
    }

    async fn evict_where(&self, key: &str, region: Option<&str>, evict: impl Fn(usize) -> bool) {
        for (index, handle) in self.inner.handles.iter().enumerate() {
            if !evict(index) {
                continue;
            }
            if let Err(error) = handle.remove(key, region).await {
                tracing::warn!(cache.name = self.name(), cache.handle = handle.name(), cache.key = key, %error, "eviction failed");
            }
        }
    }

    /// Returns the manager name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.config.name()
    }

    /// Returns the clock timestamps and expiration follow.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn configuration(&self) -> &CacheManagerConfiguration {
        &self.inner.config
    }

    /// Returns the handles in priority order.
    #[must_use]
    pub fn handles(&self) -> &[CacheHandle<V>] {
        &self.inner.handles
    }

    /// Registers a listener for every event.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(Arc::new(listener) as EventListener);
    }

    /// Registers a listener for [`CacheEvent::Add`].
    pub fn on_add<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Add { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::Put`].
    pub fn on_put<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Put { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::Remove`].
    pub fn on_remove<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Remove { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::Update`].
    pub fn on_update<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Update { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::Get`].
    pub fn on_get<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Get { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::Clear`].
    pub fn on_clear<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::Clear { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::ClearRegion`].
    pub fn on_clear_region<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe_filtered(|e| matches!(e, CacheEvent::ClearRegion { .. }), listener);
    }

    /// Registers a listener for [`CacheEvent::RemoveByHandle`].
    pub fn on_remove_by_handle<F>(&self, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.inner
            .events
            .subscribe_filtered(|e| matches!(e, CacheEvent::RemoveByHandle { .. }), listener);
    }
}

pub(crate) fn new_item<V>(key: &str, region: Option<&str>, value: V) -> Result<CacheItem<V>> {
    match region {
        Some(region) => CacheItem::in_region(key, region, value),
        None => CacheItem::new(key, value),
    }
}
