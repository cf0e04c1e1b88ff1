// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read-modify-write operations.

use strata_tier::{CacheItem, Error, Result, UpdateFn, UpdateItemResult, UpdateState, ensure_key, ensure_region};

use super::{CacheManager, new_item};
use crate::backplane::{BackplaneMessage, ChangeAction};
use crate::events::{CacheEvent, EventOrigin};

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Adds `item`, or updates the stored value with `update` if the key exists.
    ///
    /// Each attempt tries an add and then an update; an attempt fails when another writer
    /// wins both races. Up to `max_retries + 1` attempts are made, using the manager's
    /// configured retry budget. Returns the stored value, or `None` when every attempt
    /// failed or `update` declined by returning `None`.
    ///
    /// # Errors
    ///
    /// Returns the error of a failing handle.
    pub async fn add_or_update<F>(&self, item: CacheItem<V>, update: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.add_or_update_with_retries(item, update, self.configuration().max_retries())
            .await
    }

    /// Like [`add_or_update`](Self::add_or_update) with an explicit retry budget.
    ///
    /// # Errors
    ///
    /// Returns the error of a failing handle.
    pub async fn add_or_update_with_retries<F>(&self, item: CacheItem<V>, update: F, max_retries: u32) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        let key = item.key();
        let region = item.region();

        for attempt in 1..=max_retries.saturating_add(1) {
            if self.add(item.clone()).await? {
                return Ok(Some(item.value().clone()));
            }

            let result = self.update_internal(key, region, &update, max_retries).await?;
            match result.state() {
                UpdateState::Success => return Ok(result.into_item().map(CacheItem::into_value)),
                UpdateState::FactoryReturnedNull => return Ok(None),
                UpdateState::TooManyRetries | UpdateState::ItemDidNotExist => {
                    tracing::debug!(cache.name = self.name(), cache.key = key, attempt, "add or update lost a race");
                }
            }
        }

        tracing::warn!(cache.name = self.name(), cache.key = key, max_retries, "add or update gave up");
        Ok(None)
    }

    /// Updates the stored value, returning the new value or `None` if the update did not
    /// succeed.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn try_update<F>(&self, key: &str, region: Option<&str>, update: F) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.try_update_with_retries(key, region, update, self.configuration().max_retries())
            .await
    }

    /// Like [`try_update`](Self::try_update) with an explicit retry budget.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or the error of a
    /// failing handle.
    pub async fn try_update_with_retries<F>(&self, key: &str, region: Option<&str>, update: F, max_retries: u32) -> Result<Option<V>>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        let result = self.update_internal(key, region, &update, max_retries).await?;
        Ok(result.into_item().map(CacheItem::into_value))
    }

    /// Updates the stored value and fails unless the update succeeded.
    ///
    /// # Errors
    ///
    /// Returns an update-failed error carrying the final [`UpdateState`] when the item did
    /// not exist, `update` declined, or the retries ran out. Also returns validation and
    /// handle errors.
    pub async fn update<F>(&self, key: &str, region: Option<&str>, update: F) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        self.update_with_retries(key, region, update, self.configuration().max_retries())
            .await
    }

    /// Like [`update`](Self::update) with an explicit retry budget.
    ///
    /// # Errors
    ///
    /// See [`update`](Self::update).
    pub async fn update_with_retries<F>(&self, key: &str, region: Option<&str>, update: F, max_retries: u32) -> Result<V>
    where
        F: Fn(&V) -> Option<V> + Send + Sync,
    {
        let result = self.update_internal(key, region, &update, max_retries).await?;
        let state = result.state();
        result
            .into_item()
            .map(CacheItem::into_value)
            .ok_or_else(|| Error::update_failed(key, state))
    }

    /// Returns the cached value, or adds the value built by `factory`.
    ///
    /// # Errors
    ///
    /// Returns a retries-exhausted error if other writers kept removing the key between the
    /// read and the add for every attempt, plus validation and handle errors.
    pub async fn get_or_add<F>(&self, key: &str, region: Option<&str>, mut factory: F) -> Result<V>
    where
        F: FnMut() -> V + Send,
    {
        let attempts = self.configuration().max_retries().saturating_add(1);
        for _ in 0..attempts {
            if let Some(value) = self.get(key, region).await? {
                return Ok(value);
            }

            let item = new_item(key, region, factory())?;
            if self.add(item.clone()).await? {
                return Ok(item.into_value());
            }
        }

        Err(Error::retries_exhausted("get_or_add", key, attempts))
    }

    /// Returns the cached value, or adds the value built by `factory` unless it returns
    /// `None`.
    ///
    /// # Errors
    ///
    /// See [`get_or_add`](Self::get_or_add).
    pub async fn try_get_or_add<F>(&self, key: &str, region: Option<&str>, mut factory: F) -> Result<Option<V>>
    where
        F: FnMut() -> Option<V> + Send,
    {
        let attempts = self.configuration().max_retries().saturating_add(1);
        for _ in 0..attempts {
            if let Some(value) = self.get(key, region).await? {
                return Ok(Some(value));
            }

            let Some(value) = factory() else {
                return Ok(None);
            };
            let item = new_item(key, region, value)?;
            if self.add(item.clone()).await? {
                return Ok(Some(item.into_value()));
            }
        }

        Err(Error::retries_exhausted("try_get_or_add", key, attempts))
    }

    /// Runs `update` on the authoritative handle and repairs the other handles.
    ///
    /// The last handle is updated. On success the faster handles are evicted, since their
    /// copies are stale. When the update ran out of retries or found nothing, every other
    /// handle is evicted. A declined update touches nothing. [`CacheEvent::Update`] fires in
    /// every case.
    pub(crate) async fn update_internal(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateItemResult<V>> {
        ensure_key(key)?;
        ensure_region(region)?;

        let handles = self.handles();
        let Some(index) = handles.len().checked_sub(1) else {
            return Err(Error::configuration("cache manager has no handles"));
        };
        let handle = &handles[index];

        let result = handle.update(key, region, update, max_retries).await?;
        tracing::debug!(
            cache.name = self.name(),
            cache.handle = handle.name(),
            cache.key = key,
            state = result.state().as_str(),
            tries = result.number_of_tries_needed(),
            "update"
        );

        match result.state() {
            UpdateState::Success => {
                self.evict_where(key, region, |other| other < index).await;
                self.notify(|owner| BackplaneMessage::changed(owner, key, region, ChangeAction::Update))
                    .await;
            }
            UpdateState::TooManyRetries | UpdateState::ItemDidNotExist => {
                self.evict_from_other_handles(key, region, index).await;
            }
            UpdateState::FactoryReturnedNull => {}
        }

        self.inner.events.emit(|| CacheEvent::Update {
            key: key.to_owned(),
            region: region.map(str::to_owned),
            state: result.state(),
            tries: result.number_of_tries_needed(),
            origin: EventOrigin::Local,
        });
        Ok(result)
    }
}
