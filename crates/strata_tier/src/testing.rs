// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock backend for testing.
//!
//! [`MockBackend`] is an in-memory [`CacheBackend`] that records every operation, can be
//! told to fail selected operations or lose them to a simulated racing writer, and can
//! inject optimistic-concurrency conflicts so retry paths can be exercised deterministically.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::{CacheBackend, CacheItem, Error, RemovalListener, RemovalReason, UpdateFn, UpdateItemResult};

type Slot = (String, Option<String>);

/// Recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp<V> {
    /// An add of the given item.
    Add(CacheItem<V>),
    /// A put of the given item.
    Put(CacheItem<V>),
    /// A read.
    Get {
        /// The key that was read.
        key: String,
        /// The region that was read.
        region: Option<String>,
    },
    /// An existence check.
    Exists {
        /// The key that was checked.
        key: String,
        /// The region that was checked.
        region: Option<String>,
    },
    /// A removal.
    Remove {
        /// The key that was removed.
        key: String,
        /// The region that was removed from.
        region: Option<String>,
    },
    /// A full clear.
    Clear,
    /// A clear of one region.
    ClearRegion(String),
    /// An update.
    Update {
        /// The key that was updated.
        key: String,
        /// The region that was updated.
        region: Option<String>,
    },
    /// A key listing.
    Keys(Option<String>),
}

impl<V> BackendOp<V> {
    /// Returns the key the operation addressed, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Add(item) | Self::Put(item) => Some(item.key()),
            Self::Get { key, .. } | Self::Exists { key, .. } | Self::Remove { key, .. } | Self::Update { key, .. } => {
                Some(key)
            }
            Self::Clear | Self::ClearRegion(_) | Self::Keys(_) => None,
        }
    }
}

type FailPredicate<V> = Box<dyn Fn(&BackendOp<V>) -> bool + Send + Sync>;

/// A configurable mock backend for testing.
///
/// Clones share data, the operation log and failure configuration, so a test can keep a
/// clone for inspection after handing the backend to a cache.
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use strata_tier::{CacheBackend, CacheItem, testing::{BackendOp, MockBackend}};
///
/// let backend = MockBackend::<i32>::new();
/// block_on(backend.put(CacheItem::new("key", 42)?))?;
///
/// backend.fail_when(|op| matches!(op, BackendOp::Get { .. }));
/// assert!(block_on(backend.get("key", None)).is_err());
/// # Ok::<(), strata_tier::Error>(())
/// ```
pub struct MockBackend<V> {
    data: Arc<Mutex<HashMap<Slot, CacheItem<V>>>>,
    operations: Arc<Mutex<Vec<BackendOp<V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<V>>>>,
    collide_when: Arc<Mutex<Option<FailPredicate<V>>>>,
    pending_conflicts: Arc<Mutex<u32>>,
    removal_listener: Arc<Mutex<Option<RemovalListener>>>,
    key_enumeration: bool,
}

impl<V> std::fmt::Debug for MockBackend<V>
where
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("pending_conflicts", &*self.pending_conflicts.lock())
            .field("key_enumeration", &self.key_enumeration)
            .finish_non_exhaustive()
    }
}

impl<V> Clone for MockBackend<V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            collide_when: Arc::clone(&self.collide_when),
            pending_conflicts: Arc::clone(&self.pending_conflicts),
            removal_listener: Arc::clone(&self.removal_listener),
            key_enumeration: self.key_enumeration,
        }
    }
}

impl<V> Default for MockBackend<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MockBackend<V> {
    /// Creates an empty mock backend that supports key enumeration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            collide_when: Arc::new(Mutex::new(None)),
            pending_conflicts: Arc::new(Mutex::new(0)),
            removal_listener: Arc::new(Mutex::new(None)),
            key_enumeration: true,
        }
    }

    /// Sets whether the backend reports key enumeration support.
    #[must_use]
    pub fn with_key_enumeration(mut self, enabled: bool) -> Self {
        self.key_enumeration = enabled;
        self
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns `true` if an item is stored under `key` and `region`.
    #[must_use]
    pub fn contains(&self, key: &str, region: Option<&str>) -> bool {
        self.data.lock().contains_key(&slot(key, region))
    }

    /// Makes the next `count` update attempts observe a version conflict.
    pub fn conflict_next_updates(&self, count: u32) {
        *self.pending_conflicts.lock() = count;
    }

    /// Sets a predicate that decides which operations fail.
    ///
    /// Failing operations are still recorded and return a backend error without touching
    /// the stored data.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&BackendOp<V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Sets a predicate that decides which operations lose a race against another writer.
    ///
    /// A colliding add reports that the key already exists and a colliding update reports
    /// that the item vanished, in both cases without touching the stored data. Only
    /// [`BackendOp::Add`] and [`BackendOp::Update`] are offered to the predicate.
    pub fn collide_when<F>(&self, predicate: F)
    where
        F: Fn(&BackendOp<V>) -> bool + Send + Sync + 'static,
    {
        *self.collide_when.lock() = Some(Box::new(predicate));
    }

    fn should_collide(&self, op: &BackendOp<V>) -> bool {
        self.collide_when.lock().as_ref().is_some_and(|predicate| predicate(op))
    }

    /// Drops an item as if it had expired, notifying the removal listener.
    ///
    /// Returns `true` if an item was dropped.
    pub fn expire(&self, key: &str, region: Option<&str>) -> bool {
        let removed = self.data.lock().remove(&slot(key, region)).is_some();
        if removed {
            let listener = self.removal_listener.lock().clone();
            if let Some(listener) = listener {
                listener(key, region, RemovalReason::Expired);
            }
        }
        removed
    }

    fn should_fail(&self, op: &BackendOp<V>) -> bool {
        self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(op))
    }

    fn take_conflict(&self) -> bool {
        let mut pending = self.pending_conflicts.lock();
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }
}

impl<V: Clone> MockBackend<V> {
    /// Returns a copy of the item stored under `key` and `region` without recording a read.
    #[must_use]
    pub fn item(&self, key: &str, region: Option<&str>) -> Option<CacheItem<V>> {
        self.data.lock().get(&slot(key, region)).cloned()
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<BackendOp<V>> {
        self.operations.lock().clone()
    }

    /// Clears the operation log.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn record(&self, op: BackendOp<V>) -> Result<(), Error> {
        let fail = self.should_fail(&op);
        let name = op_name(&op);
        self.operations.lock().push(op);
        if fail {
            return Err(Error::from_backend(format!("mock: {name} failed")));
        }
        Ok(())
    }
}

impl<V> CacheBackend<V> for MockBackend<V>
where
    V: Clone + Send + Sync,
{
    async fn add(&self, item: CacheItem<V>) -> Result<bool, Error> {
        let op = BackendOp::Add(item.clone());
        let collide = self.should_collide(&op);
        self.record(op)?;
        if collide {
            return Ok(false);
        }
        let mut data = self.data.lock();
        let slot = slot(item.key(), item.region());
        if data.contains_key(&slot) {
            return Ok(false);
        }
        data.insert(slot, item);
        Ok(true)
    }

    async fn put(&self, item: CacheItem<V>) -> Result<(), Error> {
        self.record(BackendOp::Put(item.clone()))?;
        self.data.lock().insert(slot(item.key(), item.region()), item);
        Ok(())
    }

    async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, Error> {
        self.record(BackendOp::Get {
            key: key.to_owned(),
            region: region.map(str::to_owned),
        })?;
        Ok(self.data.lock().get(&slot(key, region)).cloned())
    }

    async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        self.record(BackendOp::Exists {
            key: key.to_owned(),
            region: region.map(str::to_owned),
        })?;
        Ok(self.data.lock().contains_key(&slot(key, region)))
    }

    async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        self.record(BackendOp::Remove {
            key: key.to_owned(),
            region: region.map(str::to_owned),
        })?;
        Ok(self.data.lock().remove(&slot(key, region)).is_some())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.record(BackendOp::Clear)?;
        self.data.lock().clear();
        Ok(())
    }

    async fn clear_region(&self, region: &str) -> Result<(), Error> {
        self.record(BackendOp::ClearRegion(region.to_owned()))?;
        self.data.lock().retain(|(_, item_region), _| item_region.as_deref() != Some(region));
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateItemResult<V>, Error> {
        let op = BackendOp::Update {
            key: key.to_owned(),
            region: region.map(str::to_owned),
        };
        let collide = self.should_collide(&op);
        self.record(op)?;
        if collide {
            return Ok(UpdateItemResult::item_did_not_exist());
        }

        let slot = slot(key, region);
        let mut tries = 0;
        loop {
            tries += 1;
            let Some(current) = self.data.lock().get(&slot).cloned() else {
                return Ok(UpdateItemResult::item_did_not_exist());
            };
            let Some(value) = update(current.value()) else {
                return Ok(UpdateItemResult::factory_returned_null(tries > 1, tries));
            };
            if self.take_conflict() {
                if tries > max_retries {
                    return Ok(UpdateItemResult::too_many_retries(tries));
                }
                continue;
            }
            let written = current.with_value(value);
            self.data.lock().insert(slot, written.clone());
            return Ok(UpdateItemResult::success(written, tries > 1, tries));
        }
    }

    async fn keys(&self, region: Option<&str>) -> Result<Vec<String>, Error> {
        self.record(BackendOp::Keys(region.map(str::to_owned)))?;
        if !self.key_enumeration {
            return Err(Error::unsupported("key enumeration is disabled on this mock"));
        }
        Ok(self
            .data
            .lock()
            .keys()
            .filter(|(_, item_region)| item_region.as_deref() == region)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn supports_key_enumeration(&self) -> bool {
        self.key_enumeration
    }

    fn set_removal_listener(&self, listener: RemovalListener) {
        *self.removal_listener.lock() = Some(listener);
    }

    fn len(&self) -> Option<u64> {
        Some(self.data.lock().len() as u64)
    }
}

fn slot(key: &str, region: Option<&str>) -> Slot {
    (key.to_owned(), region.map(str::to_owned))
}

fn op_name<V>(op: &BackendOp<V>) -> &'static str {
    match op {
        BackendOp::Add(_) => "add",
        BackendOp::Put(_) => "put",
        BackendOp::Get { .. } => "get",
        BackendOp::Exists { .. } => "exists",
        BackendOp::Remove { .. } => "remove",
        BackendOp::Clear => "clear",
        BackendOp::ClearRegion(_) => "clear_region",
        BackendOp::Update { .. } => "update",
        BackendOp::Keys(_) => "keys",
    }
}
