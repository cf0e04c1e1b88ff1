// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The storage contract every cache handle builds on.
//!
//! [`CacheBackend`] is deliberately small: it stores [`CacheItem`]s addressed by key and
//! optional region, and leaves expiration resolution, statistics and cross-tier coordination
//! to the layers above it.

use std::sync::Arc;

use crate::{CacheItem, Error, UpdateFn, UpdateItemResult};

/// Why a backend dropped an item on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemovalReason {
    /// The item's expiration elapsed.
    Expired,
    /// The backend reclaimed the slot, for example because it reached capacity.
    Evicted,
}

impl RemovalReason {
    /// Returns the reason as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Evicted => "evicted",
        }
    }
}

/// Callback invoked with `(key, region, reason)` when a backend drops an item by itself.
pub type RemovalListener = Arc<dyn Fn(&str, Option<&str>, RemovalReason) + Send + Sync>;

/// Trait for cache storage backends.
///
/// Implement this trait to plug a new store into a cache manager. Every method reports
/// expected outcomes through its return value: `add` returns `false` when the key exists,
/// `remove` returns `false` when it did not, and `get` returns `None` for a miss. An `Err`
/// means the backend itself failed.
///
/// Backends store items exactly as given. The expiration mode and timeout on an incoming
/// item have already been resolved by the owning handle, so [`ExpirationMode::Default`]
/// never reaches a backend through a manager.
///
/// [`ExpirationMode::Default`]: crate::ExpirationMode::Default
#[cfg_attr(
    any(test, feature = "dynamic"),
    dynosaur::dynosaur(pub(crate) DynCacheBackend = dyn(box) CacheBackend, bridge(none))
)]
pub trait CacheBackend<V>: Send + Sync {
    /// Stores `item` only if no item exists under its key and region.
    ///
    /// Returns `true` if the item was stored.
    fn add(&self, item: CacheItem<V>) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Stores `item`, replacing any existing item.
    fn put(&self, item: CacheItem<V>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Reads the item stored under `key` and `region`.
    fn get(&self, key: &str, region: Option<&str>) -> impl Future<Output = Result<Option<CacheItem<V>>, Error>> + Send;

    /// Returns `true` if an item is stored under `key` and `region`.
    fn exists(&self, key: &str, region: Option<&str>) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes the item stored under `key` and `region`.
    ///
    /// Returns `true` if an item was removed.
    fn remove(&self, key: &str, region: Option<&str>) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every item.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes every item stored in `region`.
    fn clear_region(&self, region: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Replaces the stored value with `update(current)`.
    ///
    /// Backends with optimistic concurrency retry on version conflicts up to `max_retries`
    /// times and report [`UpdateState::TooManyRetries`](crate::UpdateState::TooManyRetries)
    /// when the budget runs out. Backends that update atomically succeed on the first attempt.
    fn update(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        max_retries: u32,
    ) -> impl Future<Output = Result<UpdateItemResult<V>, Error>> + Send;

    /// Lists the keys stored in `region`, or the keys outside any region when `region` is
    /// `None`.
    ///
    /// Only called when [`supports_key_enumeration`](Self::supports_key_enumeration) returns
    /// `true`. The default implementation reports the operation as unsupported.
    fn keys(&self, region: Option<&str>) -> impl Future<Output = Result<Vec<String>, Error>> + Send {
        let _ = region;
        async { Err(Error::unsupported("this backend cannot enumerate keys")) }
    }

    /// Returns `true` if [`keys`](Self::keys) is implemented.
    fn supports_key_enumeration(&self) -> bool {
        false
    }

    /// Registers a callback for items the backend drops on its own.
    ///
    /// Backends without self-driven removal ignore the listener.
    fn set_removal_listener(&self, listener: RemovalListener) {
        drop(listener);
    }

    /// Returns the number of stored items, if the backend tracks it.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the backend holds no items.
    ///
    /// Returns `None` for backends that don't track size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}
