// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A single tier of a cache manager.

use std::fmt::Debug;
use std::time::{Duration, Instant, SystemTime};

use strata_tier::{
    CacheBackend, CacheItem, DynamicBackend, Error, ExpirationMode, RemovalListener, RemovalReason, Result, UpdateFn,
    UpdateItemResult, UpdateState,
};
use tick::Clock;

use crate::config::CacheHandleConfiguration;
use crate::stats::CacheStats;
use crate::telemetry::{CacheActivity, CacheOperation, CacheTelemetry};

/// One backend together with its configuration, statistics and telemetry.
///
/// A handle resolves the expiration of every item it stores, stamps its creation time from
/// the manager's clock, counts what passes through it and records telemetry; the backend
/// only stores. Items past their absolute expiration by that clock are treated as missing
/// even if the backend still holds them. Handles are owned by a
/// [`CacheManager`](crate::CacheManager) and can be inspected through
/// [`CacheManager::handles`](crate::CacheManager::handles).
///
/// Calling a handle directly bypasses the manager: no other handle, event or backplane
/// peer learns about the change.
pub struct CacheHandle<V> {
    backend: DynamicBackend<V>,
    config: CacheHandleConfiguration,
    stats: CacheStats,
    clock: Clock,
    telemetry: CacheTelemetry,
}

impl<V> CacheHandle<V> {
    pub(crate) fn new(
        config: CacheHandleConfiguration,
        backend: DynamicBackend<V>,
        clock: Clock,
        telemetry: CacheTelemetry,
    ) -> Self {
        Self {
            backend,
            stats: CacheStats::new(config.enable_statistics()),
            config,
            clock,
            telemetry,
        }
    }

    /// Returns the handle name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Returns the handle configuration.
    #[must_use]
    pub fn configuration(&self) -> &CacheHandleConfiguration {
        &self.config
    }

    /// Returns the handle statistics.
    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn record(&self, operation: CacheOperation, activity: CacheActivity, started: Instant) {
        let elapsed = self.clock.instant().saturating_duration_since(started);
        self.telemetry.record(self.name(), operation, activity, Some(elapsed));
    }

    async fn observe<T>(
        &self,
        operation: CacheOperation,
        call: impl Future<Output = Result<T>>,
        activity: impl FnOnce(&T) -> CacheActivity,
    ) -> Result<T> {
        let started = self.clock.instant();
        let result = call.await;
        if self.telemetry.is_enabled() {
            let activity = result.as_ref().map_or(CacheActivity::Error, activity);
            self.record(operation, activity, started);
        }
        result
    }
}

impl<V> CacheHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Stores `item` if the key is absent in this handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the item's expiration can't be resolved or the backend fails.
    pub async fn add(&self, mut item: CacheItem<V>) -> Result<bool> {
        item.ensure_created_utc(self.clock.system_time());
        let item = resolve_expiration(item, &self.config)?;
        let region = item.region().map(str::to_owned);
        let added = self
            .observe(CacheOperation::Add, self.backend.add(item), |added| {
                if *added { CacheActivity::Inserted } else { CacheActivity::Rejected }
            })
            .await?;

        self.stats.on_add(region.as_deref(), added);
        self.record_size();
        Ok(added)
    }

    /// Stores `item`, replacing any existing item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item's expiration can't be resolved or the backend fails.
    pub async fn put(&self, mut item: CacheItem<V>) -> Result<()> {
        item.ensure_created_utc(self.clock.system_time());
        let item = resolve_expiration(item, &self.config)?;
        let region = item.region().map(str::to_owned);

        // Only pay for the extra lookup when it feeds the item counter.
        let existed = if self.stats.is_enabled() {
            self.backend.exists(item.key(), item.region()).await?
        } else {
            true
        };

        self.observe(CacheOperation::Put, self.backend.put(item), |()| CacheActivity::Inserted)
            .await?;

        self.stats.on_put(region.as_deref(), !existed);
        self.record_size();
        Ok(())
    }

    /// Reads an item.
    ///
    /// An item past its absolute expiration is removed from the backend and reported as
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>> {
        let now = self.clock.system_time();
        let item = self
            .observe(CacheOperation::Get, self.backend.get(key, region), |item| match item {
                Some(item) if is_expired(item, now) => CacheActivity::Expired,
                Some(_) => CacheActivity::Hit,
                None => CacheActivity::Miss,
            })
            .await?;

        let item = match item {
            Some(item) if is_expired(&item, now) => {
                self.drop_expired(key, region).await;
                None
            }
            item => item,
        };

        self.stats.on_get(region, item.is_some());
        Ok(item)
    }

    async fn drop_expired(&self, key: &str, region: Option<&str>) {
        match self.backend.remove(key, region).await {
            Ok(true) => self.stats.on_dropped(region),
            Ok(false) => {}
            Err(error) => {
                tracing::warn!(cache.handle = self.name(), cache.key = key, %error, "expired item removal failed");
            }
        }
        self.record_size();
    }

    /// Returns `true` if this handle holds the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool> {
        self.observe(CacheOperation::Exists, self.backend.exists(key, region), |exists| {
            if *exists { CacheActivity::Hit } else { CacheActivity::Miss }
        })
        .await
    }

    /// Removes an item, returning `true` if this handle held it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool> {
        let removed = self
            .observe(CacheOperation::Remove, self.backend.remove(key, region), |removed| {
                if *removed { CacheActivity::Removed } else { CacheActivity::Miss }
            })
            .await?;

        self.stats.on_remove(region, removed);
        self.record_size();
        Ok(removed)
    }

    /// Removes every item.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn clear(&self) -> Result<()> {
        self.observe(CacheOperation::Clear, self.backend.clear(), |()| CacheActivity::Ok)
            .await?;

        self.stats.on_clear();
        self.record_size();
        Ok(())
    }

    /// Removes every item in `region`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn clear_region(&self, region: &str) -> Result<()> {
        self.observe(CacheOperation::ClearRegion, self.backend.clear_region(region), |()| CacheActivity::Ok)
            .await?;

        self.stats.on_clear_region(region);
        self.record_size();
        Ok(())
    }

    /// Applies `update` to the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn update(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateItemResult<V>> {
        let result = self
            .observe(CacheOperation::Update, self.backend.update(key, region, update, max_retries), |result| {
                match result.state() {
                    UpdateState::Success => CacheActivity::Updated,
                    UpdateState::TooManyRetries => CacheActivity::Conflict,
                    UpdateState::ItemDidNotExist => CacheActivity::Miss,
                    UpdateState::FactoryReturnedNull => CacheActivity::Declined,
                }
            })
            .await?;

        self.stats.on_update(region, result.state(), result.number_of_tries_needed());
        Ok(result)
    }

    /// Lists the keys in `region`.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error if the backend can't enumerate keys, or an
    /// error if the backend fails.
    pub async fn keys(&self, region: Option<&str>) -> Result<Vec<String>> {
        if !self.supports_key_enumeration() {
            return Err(Error::unsupported(format!("handle '{}' cannot enumerate keys", self.name())));
        }
        self.observe(CacheOperation::Keys, self.backend.keys(region), |_| CacheActivity::Ok)
            .await
    }

    /// Returns `true` if the backend can enumerate keys.
    #[must_use]
    pub fn supports_key_enumeration(&self) -> bool {
        self.backend.supports_key_enumeration()
    }

    /// Returns the number of items, if the backend tracks it.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        self.backend.len()
    }

    /// Returns `true` if the handle is empty, if the backend tracks its size.
    #[must_use]
    pub fn is_empty(&self) -> Option<bool> {
        self.backend.is_empty()
    }

    pub(crate) fn set_removal_listener(&self, listener: RemovalListener) {
        self.backend.set_removal_listener(listener);
    }

    /// Accounts for an item the backend dropped on its own.
    pub(crate) fn on_removed_by_backend(&self, region: Option<&str>, reason: RemovalReason) {
        self.stats.on_dropped(region);
        let activity = match reason {
            RemovalReason::Expired => CacheActivity::Expired,
            RemovalReason::Evicted => CacheActivity::Evicted,
        };
        self.telemetry.record(self.name(), CacheOperation::Evict, activity, None);
    }

    fn record_size(&self) {
        if let Some(size) = self.backend.len() {
            self.telemetry.record_size(self.name(), size);
        }
    }
}

impl<V> Debug for CacheHandle<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Returns `true` if an absolutely expiring item has outlived its timeout at `now`.
///
/// Sliding expiration is left to the backend, which sees every read.
fn is_expired<V>(item: &CacheItem<V>, now: SystemTime) -> bool {
    if item.expiration_mode() != ExpirationMode::Absolute {
        return false;
    }
    let Some(created) = item.created_utc() else {
        return false;
    };
    // A creation time ahead of the clock means the clock went backwards; keep the item.
    now.duration_since(created)
        .is_ok_and(|age| age >= item.expiration_timeout())
}

/// Resolves the expiration an item is stored with in a handle.
///
/// An explicit item expiration wins. Otherwise the handle's configured expiration applies,
/// and without one the item never expires. The result is flagged as using defaults unless
/// the item chose its own, so the next handle resolves it afresh.
///
/// # Errors
///
/// Returns a configuration error if the resolved mode is sliding or absolute without a
/// timeout.
pub(crate) fn resolve_expiration<V: Clone>(item: CacheItem<V>, config: &CacheHandleConfiguration) -> Result<CacheItem<V>> {
    let explicit = item.expiration_mode() != ExpirationMode::Default && !item.uses_expiration_defaults();

    let resolved = if explicit {
        item
    } else if config.expiration_mode() == ExpirationMode::Default {
        item.with_expiration_defaults(ExpirationMode::None, Duration::ZERO)
    } else {
        let mode = config.expiration_mode();
        let timeout = if mode.requires_timeout() { config.expiration_timeout() } else { Duration::ZERO };
        item.with_expiration_defaults(mode, timeout)
    };

    if resolved.expiration_mode().requires_timeout() && resolved.expiration_timeout().is_zero() {
        return Err(Error::configuration(format!(
            "handle '{}' resolved {:?} expiration for '{}' without a timeout",
            config.name(),
            resolved.expiration_mode(),
            resolved.key()
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use strata_tier::DynamicBackendExt;
    use strata_tier::testing::{BackendOp, MockBackend};
    use tick::ClockControl;

    use super::*;
    use crate::stats::CacheStatsCounter;
    use crate::telemetry::testing::LogCapture;

    fn handle(config: CacheHandleConfiguration) -> (CacheHandle<i32>, MockBackend<i32>) {
        handle_with_clock(config, Clock::new_frozen())
    }

    fn handle_with_clock(config: CacheHandleConfiguration, clock: Clock) -> (CacheHandle<i32>, MockBackend<i32>) {
        let backend = MockBackend::new();
        let handle = CacheHandle::new(config, backend.clone().into_dynamic(), clock, CacheTelemetry::new("c", true));
        (handle, backend)
    }

    #[test]
    fn explicit_item_expiration_wins() {
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Absolute, Duration::from_secs(5));
        let item = CacheItem::new("k", 1).unwrap().with_sliding_expiration(Duration::from_secs(1)).unwrap();

        let resolved = resolve_expiration(item, &config).unwrap();

        assert_eq!(resolved.expiration_mode(), ExpirationMode::Sliding);
        assert_eq!(resolved.expiration_timeout(), Duration::from_secs(1));
        assert!(!resolved.uses_expiration_defaults());
    }

    #[test]
    fn handle_defaults_fill_in() {
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Absolute, Duration::from_secs(5));

        let resolved = resolve_expiration(CacheItem::new("k", 1).unwrap(), &config).unwrap();

        assert_eq!(resolved.expiration_mode(), ExpirationMode::Absolute);
        assert_eq!(resolved.expiration_timeout(), Duration::from_secs(5));
        assert!(resolved.uses_expiration_defaults());
    }

    #[test]
    fn defaults_are_resolved_again_by_the_next_handle() {
        let first = CacheHandleConfiguration::new("a").with_expiration(ExpirationMode::Absolute, Duration::from_secs(5));
        let second = CacheHandleConfiguration::new("b").with_expiration(ExpirationMode::Sliding, Duration::from_secs(9));

        let resolved = resolve_expiration(CacheItem::new("k", 1).unwrap(), &first).unwrap();
        let resolved = resolve_expiration(resolved, &second).unwrap();

        assert_eq!(resolved.expiration_mode(), ExpirationMode::Sliding);
        assert_eq!(resolved.expiration_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn without_any_expiration_items_never_expire() {
        let resolved = resolve_expiration(CacheItem::new("k", 1).unwrap(), &CacheHandleConfiguration::new("h")).unwrap();

        assert_eq!(resolved.expiration_mode(), ExpirationMode::None);
        assert_eq!(resolved.expiration_timeout(), Duration::ZERO);
    }

    #[test]
    fn timed_defaults_without_timeout_fail_fast() {
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Sliding, Duration::ZERO);

        let error = resolve_expiration(CacheItem::new("k", 1).unwrap(), &config).unwrap_err();

        assert!(error.is_configuration());
    }

    #[test]
    fn operations_update_stats() {
        let (handle, _) = handle(CacheHandleConfiguration::new("h"));

        block_on(async {
            assert!(handle.add(CacheItem::new("a", 1).unwrap()).await.unwrap());
            assert!(!handle.add(CacheItem::new("a", 2).unwrap()).await.unwrap());
            handle.put(CacheItem::in_region("b", "r", 3).unwrap()).await.unwrap();
            handle.put(CacheItem::in_region("b", "r", 4).unwrap()).await.unwrap();
            assert!(handle.get("a", None).await.unwrap().is_some());
            assert!(handle.get("zzz", None).await.unwrap().is_none());
            assert!(handle.remove("a", None).await.unwrap());
        });

        let stats = handle.stats();
        assert_eq!(stats.counter(CacheStatsCounter::AddCalls, None), 2);
        assert_eq!(stats.counter(CacheStatsCounter::PutCalls, None), 2);
        assert_eq!(stats.counter(CacheStatsCounter::Hits, None), 1);
        assert_eq!(stats.counter(CacheStatsCounter::Misses, None), 1);
        assert_eq!(stats.counter(CacheStatsCounter::Items, None), 1);
        assert_eq!(stats.counter(CacheStatsCounter::Items, Some("r")), 1);
    }

    #[test]
    fn put_skips_existence_check_without_stats() {
        let (handle, backend) = handle(CacheHandleConfiguration::new("h").with_statistics(false));

        block_on(handle.put(CacheItem::new("a", 1).unwrap())).unwrap();

        assert_eq!(backend.operations().len(), 1);
        assert!(matches!(backend.operations()[0], BackendOp::Put(_)));
    }

    #[test]
    fn stored_items_carry_resolved_expiration() {
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Sliding, Duration::from_secs(3));
        let (handle, backend) = handle(config);

        block_on(handle.add(CacheItem::new("a", 1).unwrap())).unwrap();

        let stored = backend.item("a", None).unwrap();
        assert_eq!(stored.expiration_mode(), ExpirationMode::Sliding);
        assert_eq!(stored.expiration_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn backend_errors_propagate_and_are_logged() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let (handle, backend) = handle(CacheHandleConfiguration::new("failing"));
        backend.fail_when(|op| matches!(op, BackendOp::Get { .. }));

        assert!(block_on(handle.get("a", None)).is_err());

        capture.assert_contains("failing");
        capture.assert_contains(CacheActivity::Error.as_str());
        assert_eq!(handle.stats().counter(CacheStatsCounter::GetCalls, None), 0);
    }

    #[test]
    fn keys_require_enumeration_support() {
        let backend = MockBackend::<i32>::new().with_key_enumeration(false);
        let handle = CacheHandle::new(
            CacheHandleConfiguration::new("h"),
            backend.into_dynamic(),
            Clock::new_frozen(),
            CacheTelemetry::new("c", false),
        );

        let error = block_on(handle.keys(None)).unwrap_err();

        assert!(matches!(error.kind(), strata_tier::ErrorKind::Unsupported(_)));
    }

    #[test]
    fn update_counts_tries() {
        let (handle, backend) = handle(CacheHandleConfiguration::new("h"));
        block_on(handle.put(CacheItem::new("a", 1).unwrap())).unwrap();
        backend.conflict_next_updates(2);

        let result = block_on(handle.update("a", None, &|v: &i32| Some(v + 1), 10)).unwrap();

        assert_eq!(result.state(), UpdateState::Success);
        assert_eq!(handle.stats().counter(CacheStatsCounter::GetCalls, None), 3);
        assert_eq!(handle.stats().counter(CacheStatsCounter::PutCalls, None), 2);
    }

    #[test]
    fn stored_items_are_stamped_by_the_clock() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let (handle, backend) = handle_with_clock(CacheHandleConfiguration::new("h"), Clock::new_frozen_at(created));
        let stamped_elsewhere = CacheItem::new("b", 2).unwrap().with_created_utc(SystemTime::UNIX_EPOCH);

        block_on(async {
            handle.add(CacheItem::new("a", 1).unwrap()).await.unwrap();
            handle.put(stamped_elsewhere).await.unwrap();
        });

        assert_eq!(backend.item("a", None).unwrap().created_utc(), Some(created));
        assert_eq!(backend.item("a", None).unwrap().last_accessed_utc(), Some(created));
        assert_eq!(backend.item("b", None).unwrap().created_utc(), Some(SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn absolute_expiration_follows_the_clock() {
        let control = ClockControl::new();
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Absolute, Duration::from_secs(10));
        let (handle, backend) = handle_with_clock(config, control.to_clock());
        block_on(handle.add(CacheItem::new("a", 1).unwrap())).unwrap();

        control.advance(Duration::from_secs(9));
        assert!(block_on(handle.get("a", None)).unwrap().is_some());

        control.advance(Duration::from_secs(1));
        assert!(block_on(handle.get("a", None)).unwrap().is_none());
        assert!(!backend.contains("a", None));
        assert_eq!(handle.stats().counter(CacheStatsCounter::Items, None), 0);
        assert_eq!(handle.stats().counter(CacheStatsCounter::Misses, None), 1);
    }

    #[test]
    fn sliding_items_are_left_to_the_backend() {
        let control = ClockControl::new();
        let config = CacheHandleConfiguration::new("h").with_expiration(ExpirationMode::Sliding, Duration::from_secs(1));
        let (handle, _) = handle_with_clock(config, control.to_clock());
        block_on(handle.add(CacheItem::new("a", 1).unwrap())).unwrap();

        control.advance(Duration::from_secs(60));

        assert!(block_on(handle.get("a", None)).unwrap().is_some());
    }

    #[test]
    fn removal_by_backend_adjusts_items() {
        let (handle, _) = handle(CacheHandleConfiguration::new("h"));
        block_on(handle.add(CacheItem::new("a", 1).unwrap())).unwrap();

        handle.on_removed_by_backend(None, RemovalReason::Expired);

        assert_eq!(handle.stats().counter(CacheStatsCounter::Items, None), 0);
    }
}
