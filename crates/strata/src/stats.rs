// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-handle statistics.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::{Mutex, RwLock};
use strata_tier::UpdateState;

const COUNTERS: usize = 9;

/// The statistics a [`CacheStats`] tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheStatsCounter {
    /// Calls to `add`.
    AddCalls,
    /// Calls to `clear`.
    ClearCalls,
    /// Calls to `clear_region`.
    ClearRegionCalls,
    /// Reads, including the reads an update performs.
    GetCalls,
    /// Reads that found an item.
    Hits,
    /// Items currently held, as far as this handle has observed.
    Items,
    /// Reads that found nothing.
    Misses,
    /// Calls to `put`, including successful updates.
    PutCalls,
    /// Calls to `remove`.
    RemoveCalls,
}

impl CacheStatsCounter {
    /// Every counter, in declaration order.
    pub const ALL: [Self; COUNTERS] = [
        Self::AddCalls,
        Self::ClearCalls,
        Self::ClearRegionCalls,
        Self::GetCalls,
        Self::Hits,
        Self::Items,
        Self::Misses,
        Self::PutCalls,
        Self::RemoveCalls,
    ];

    /// Returns the counter name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddCalls => "add_calls",
            Self::ClearCalls => "clear_calls",
            Self::ClearRegionCalls => "clear_region_calls",
            Self::GetCalls => "get_calls",
            Self::Hits => "hits",
            Self::Items => "items",
            Self::Misses => "misses",
            Self::PutCalls => "put_calls",
            Self::RemoveCalls => "remove_calls",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct Counters([AtomicI64; COUNTERS]);

impl Counters {
    fn add(&self, counter: CacheStatsCounter, delta: i64) {
        self.0[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn get(&self, counter: CacheStatsCounter) -> i64 {
        self.0[counter.index()].load(Ordering::Relaxed)
    }

    fn take(&self, counter: CacheStatsCounter) -> i64 {
        self.0[counter.index()].swap(0, Ordering::Relaxed)
    }
}

/// Hit, miss and write counters of one cache handle.
///
/// Counters are tracked for the handle as a whole and separately for every region that has
/// been touched. The whole-handle counters include region activity.
///
/// # Examples
///
/// ```
/// use strata::{CacheStats, CacheStatsCounter};
///
/// let stats = CacheStats::new(true);
/// assert_eq!(stats.counter(CacheStatsCounter::Hits, None), 0);
/// ```
pub struct CacheStats {
    enabled: bool,
    total: Counters,
    regions: RwLock<HashMap<String, Arc<Counters>>>,
    // Region clears move item counts between two counter sets.
    items_lock: Mutex<()>,
}

impl CacheStats {
    /// Creates statistics; when `enabled` is `false` nothing is recorded.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            total: Counters::default(),
            regions: RwLock::new(HashMap::new()),
            items_lock: Mutex::new(()),
        }
    }

    /// Returns `true` if statistics are recorded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reads a counter for the whole handle (`None`) or for one region.
    #[must_use]
    pub fn counter(&self, counter: CacheStatsCounter, region: Option<&str>) -> i64 {
        match region {
            None => self.total.get(counter),
            Some(region) => self.regions.read().get(region).map_or(0, |counters| counters.get(counter)),
        }
    }

    pub(crate) fn on_add(&self, region: Option<&str>, added: bool) {
        self.record(region, CacheStatsCounter::AddCalls, 1);
        if added {
            self.record(region, CacheStatsCounter::Items, 1);
        }
    }

    pub(crate) fn on_put(&self, region: Option<&str>, item_added: bool) {
        self.record(region, CacheStatsCounter::PutCalls, 1);
        if item_added {
            self.record(region, CacheStatsCounter::Items, 1);
        }
    }

    pub(crate) fn on_get(&self, region: Option<&str>, hit: bool) {
        self.record(region, CacheStatsCounter::GetCalls, 1);
        let outcome = if hit { CacheStatsCounter::Hits } else { CacheStatsCounter::Misses };
        self.record(region, outcome, 1);
    }

    pub(crate) fn on_remove(&self, region: Option<&str>, removed: bool) {
        self.record(region, CacheStatsCounter::RemoveCalls, 1);
        if removed {
            self.record(region, CacheStatsCounter::Items, -1);
        }
    }

    /// An item left the handle without a call through it.
    pub(crate) fn on_dropped(&self, region: Option<&str>) {
        self.record(region, CacheStatsCounter::Items, -1);
    }

    pub(crate) fn on_update(&self, region: Option<&str>, state: UpdateState, tries: u32) {
        self.record(region, CacheStatsCounter::GetCalls, i64::from(tries));
        if state == UpdateState::Success {
            self.record(region, CacheStatsCounter::PutCalls, 1);
        }
    }

    pub(crate) fn on_clear(&self) {
        if !self.enabled {
            return;
        }

        let _guard = self.items_lock.lock();
        self.total.add(CacheStatsCounter::ClearCalls, 1);
        self.total.take(CacheStatsCounter::Items);
        for counters in self.regions.read().values() {
            counters.take(CacheStatsCounter::Items);
        }
    }

    pub(crate) fn on_clear_region(&self, region: &str) {
        if !self.enabled {
            return;
        }

        let counters = self.region(region);
        let _guard = self.items_lock.lock();
        counters.add(CacheStatsCounter::ClearRegionCalls, 1);
        self.total.add(CacheStatsCounter::ClearRegionCalls, 1);
        let items = counters.take(CacheStatsCounter::Items);
        self.total.add(CacheStatsCounter::Items, -items);
    }

    fn record(&self, region: Option<&str>, counter: CacheStatsCounter, delta: i64) {
        if !self.enabled {
            return;
        }

        self.total.add(counter, delta);
        if let Some(region) = region {
            self.region(region).add(counter, delta);
        }
    }

    fn region(&self, region: &str) -> Arc<Counters> {
        if let Some(counters) = self.regions.read().get(region) {
            return Arc::clone(counters);
        }
        Arc::clone(self.regions.write().entry(region.to_owned()).or_default())
    }
}

impl Debug for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for counter in CacheStatsCounter::ALL {
            map.entry(&counter.as_str(), &self.total.get(counter));
        }
        map.finish()
    }
}
