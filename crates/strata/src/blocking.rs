// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous access to a cache manager.

use std::time::{Duration, SystemTime};

use futures::executor::block_on;
use strata_tier::{CacheItem, ExpirationMode, Result};

use crate::manager::CacheManager;

/// Drives every [`CacheManager`] operation to completion on the calling thread.
///
/// Semantics are those of the wrapped manager. Must not be used from within an async
/// context: the calling thread is parked until the operation completes.
///
/// # Examples
///
/// ```
/// use strata::{BlockingCacheManager, CacheHandleConfiguration, CacheManager};
/// use tick::Clock;
///
/// let cache = BlockingCacheManager::new(
///     CacheManager::<u32>::builder("counters", Clock::new_frozen())
///         .with_memory_handle(CacheHandleConfiguration::new("local"))
///         .build()?,
/// );
///
/// cache.put_value("hits", None, 1)?;
/// assert_eq!(cache.update("hits", None, |v| Some(v + 1))?, 2);
/// # Ok::<(), strata::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct BlockingCacheManager<V> {
    inner: CacheManager<V>,
}

impl<V> BlockingCacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wraps `manager`.
    #[must_use]
    pub fn new(manager: CacheManager<V>) -> Self {
        Self { inner: manager }
    }

    /// Returns the wrapped manager.
    #[must_use]
    pub fn manager(&self) -> &CacheManager<V> {
        &self.inner
    }

    /// Unwraps the manager.
    #[must_use]
    pub fn into_inner(self) -> CacheManager<V> {
        self.inner
    }

    /// See [`CacheManager::get_cache_item`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get_cache_item`].
    pub fn get_cache_item(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>> {
        block_on(self.inner.get_cache_item(key, region))
    }

    /// See [`CacheManager::get`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get`].
    pub fn get(&self, key: &str, region: Option<&str>) -> Result<Option<V>> {
        block_on(self.inner.get(key, region))
    }

    /// See [`CacheManager::exists`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::exists`].
    pub fn exists(&self, key: &str, region: Option<&str>) -> Result<bool> {
        block_on(self.inner.exists(key, region))
    }

    /// See [`CacheManager::add`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::add`].
    pub fn add(&self, item: CacheItem<V>) -> Result<bool> {
        block_on(self.inner.add(item))
    }

    /// See [`CacheManager::add_value`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::add_value`].
    pub fn add_value(&self, key: &str, region: Option<&str>, value: V) -> Result<bool> {
        block_on(self.inner.add_value(key, region, value))
    }

    /// See [`CacheManager::put`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::put`].
    pub fn put(&self, item: CacheItem<V>) -> Result<()> {
        block_on(self.inner.put(item))
    }

    /// See [`CacheManager::put_value`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::put_value`].
    pub fn put_value(&self, key: &str, region: Option<&str>, value: V) -> Result<()> {
        block_on(self.inner.put_value(key, region, value))
    }

    /// See [`CacheManager::remove`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::remove`].
    pub fn remove(&self, key: &str, region: Option<&str>) -> Result<bool> {
        block_on(self.inner.remove(key, region))
    }

    /// See [`CacheManager::clear`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::clear`].
    pub fn clear(&self) -> Result<()> {
        block_on(self.inner.clear())
    }

    /// See [`CacheManager::clear_region`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::clear_region`].
    pub fn clear_region(&self, region: &str) -> Result<()> {
        block_on(self.inner.clear_region(region))
    }

    /// See [`CacheManager::add_or_update`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::add_or_update`].
    pub fn add_or_update<F>(&self, item: CacheItem<V>, update: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.add_or_update(item, update))
    }

    /// See [`CacheManager::add_or_update_with_retries`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::add_or_update_with_retries`].
    pub fn add_or_update_with_retries<F>(&self, item: CacheItem<V>, update: F, max_retries: u32) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.add_or_update_with_retries(item, update, max_retries))
    }

    /// See [`CacheManager::try_update`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::try_update`].
    pub fn try_update<F>(&self, key: &str, region: Option<&str>, update: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.try_update(key, region, update))
    }

    /// See [`CacheManager::try_update_with_retries`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::try_update_with_retries`].
    pub fn try_update_with_retries<F>(&self, key: &str, region: Option<&str>, update: F, max_retries: u32) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.try_update_with_retries(key, region, update, max_retries))
    }

    /// See [`CacheManager::update`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::update`].
    pub fn update<F>(&self, key: &str, region: Option<&str>, update: F) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.update(key, region, update))
    }

    /// See [`CacheManager::update_with_retries`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::update_with_retries`].
    pub fn update_with_retries<F>(&self, key: &str, region: Option<&str>, update: F, max_retries: u32) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        block_on(self.inner.update_with_retries(key, region, update, max_retries))
    }

    /// See [`CacheManager::get_or_add`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get_or_add`].
    pub fn get_or_add<F>(&self, key: &str, region: Option<&str>, factory: F) -> Result<V>
    where
        F: FnMut() -> V + Send,
    {
        block_on(self.inner.get_or_add(key, region, factory))
    }

    /// See [`CacheManager::try_get_or_add`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::try_get_or_add`].
    pub fn try_get_or_add<F>(&self, key: &str, region: Option<&str>, factory: F) -> Result<Option<V>>
    where
        F: FnMut() -> Option<V> + Send,
    {
        block_on(self.inner.try_get_or_add(key, region, factory))
    }

    /// See [`CacheManager::find_keys`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::find_keys`].
    pub fn find_keys(&self, pattern: &str, region: Option<&str>) -> Result<Vec<String>> {
        block_on(self.inner.find_keys(pattern, region))
    }

    /// See [`CacheManager::get_all_keys`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::get_all_keys`].
    pub fn get_all_keys(&self) -> Result<Vec<String>> {
        block_on(self.inner.get_all_keys())
    }

    /// See [`CacheManager::expire`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::expire`].
    pub fn expire(&self, key: &str, region: Option<&str>, mode: ExpirationMode, timeout: Duration) -> Result<bool> {
        block_on(self.inner.expire(key, region, mode, timeout))
    }

    /// See [`CacheManager::expire_absolute`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::expire_absolute`].
    pub fn expire_absolute(&self, key: &str, region: Option<&str>, timeout: Duration) -> Result<bool> {
        block_on(self.inner.expire_absolute(key, region, timeout))
    }

    /// See [`CacheManager::expire_absolute_at`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::expire_absolute_at`].
    pub fn expire_absolute_at(&self, key: &str, region: Option<&str>, deadline: SystemTime) -> Result<bool> {
        block_on(self.inner.expire_absolute_at(key, region, deadline))
    }

    /// See [`CacheManager::expire_sliding`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::expire_sliding`].
    pub fn expire_sliding(&self, key: &str, region: Option<&str>, timeout: Duration) -> Result<bool> {
        block_on(self.inner.expire_sliding(key, region, timeout))
    }

    /// See [`CacheManager::remove_expiration`].
    ///
    /// # Errors
    ///
    /// See [`CacheManager::remove_expiration`].
    pub fn remove_expiration(&self, key: &str, region: Option<&str>) -> Result<bool> {
        block_on(self.inner.remove_expiration(key, region))
    }
}

impl<V> From<CacheManager<V>> for BlockingCacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn from(manager: CacheManager<V>) -> Self {
        Self::new(manager)
    }
}

#[cfg(test)]
mod tests {
    use strata_tier::testing::MockBackend;
    use tick::Clock;

    use super::*;
    use crate::config::CacheHandleConfiguration;

    fn cache() -> BlockingCacheManager<i32> {
        CacheManager::builder("blocking", Clock::new_frozen())
            .with_handle(CacheHandleConfiguration::new("a"), MockBackend::new())
            .with_handle(CacheHandleConfiguration::new("b"), MockBackend::new())
            .build()
            .unwrap()
            .into()
    }

    #[test]
    fn mirrors_manager_operations() {
        let cache = cache();

        assert!(cache.add_value("k", None, 1).unwrap());
        assert!(!cache.add_value("k", None, 2).unwrap());
        assert_eq!(cache.get("k", None).unwrap(), Some(1));
        assert_eq!(cache.update("k", None, |v| Some(v + 1)).unwrap(), 2);
        assert_eq!(cache.get_or_add("other", None, || 7).unwrap(), 7);

        let mut keys = cache.get_all_keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k".to_string(), "other".to_string()]);

        assert!(cache.remove("k", None).unwrap());
        assert!(!cache.exists("k", None).unwrap());
    }

    #[test]
    fn shares_state_with_wrapped_manager() {
        let cache = cache();
        cache.put_value("k", Some("r"), 3).unwrap();

        let manager = cache.manager().clone();
        assert_eq!(futures::executor::block_on(manager.get("k", Some("r"))).unwrap(), Some(3));

        cache.clear_region("r").unwrap();
        assert_eq!(cache.into_inner().handles()[1].len(), Some(0));
    }
}
