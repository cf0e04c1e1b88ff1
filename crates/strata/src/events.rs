// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Events fired by a cache manager.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_tier::{RemovalReason, UpdateState};

/// Where the change behind an event originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventOrigin {
    /// A call on this manager.
    Local,
    /// A backplane message from another manager.
    Remote,
}

/// An event fired once per logical manager operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// An item was added to every handle.
    Add {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// An item was written to every handle.
    Put {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// An item was removed locally, or evicted because a peer removed it.
    Remove {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// An update finished, whatever its outcome.
    Update {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Outcome of the update.
        state: UpdateState,
        /// Attempts the update needed.
        tries: u32,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// A read found the item.
    Get {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// Every handle was cleared.
    Clear {
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// A region was cleared in every handle.
    ClearRegion {
        /// The cleared region.
        region: String,
        /// Where the change originated.
        origin: EventOrigin,
    },
    /// A handle dropped an item on its own.
    RemoveByHandle {
        /// Item key.
        key: String,
        /// Item region.
        region: Option<String>,
        /// Name of the handle that dropped the item.
        handle: String,
        /// Why the handle dropped it.
        reason: RemovalReason,
    },
}

impl CacheEvent {
    /// Returns the key the event concerns, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Add { key, .. }
            | Self::Put { key, .. }
            | Self::Remove { key, .. }
            | Self::Update { key, .. }
            | Self::Get { key, .. }
            | Self::RemoveByHandle { key, .. } => Some(key),
            Self::Clear { .. } | Self::ClearRegion { .. } => None,
        }
    }

    /// Returns the region the event concerns, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        match self {
            Self::Add { region, .. }
            | Self::Put { region, .. }
            | Self::Remove { region, .. }
            | Self::Update { region, .. }
            | Self::Get { region, .. }
            | Self::RemoveByHandle { region, .. } => region.as_deref(),
            Self::ClearRegion { region, .. } => Some(region),
            Self::Clear { .. } => None,
        }
    }

    /// Returns where the change originated.
    #[must_use]
    pub fn origin(&self) -> EventOrigin {
        match self {
            Self::Add { origin, .. }
            | Self::Put { origin, .. }
            | Self::Remove { origin, .. }
            | Self::Update { origin, .. }
            | Self::Get { origin, .. }
            | Self::Clear { origin }
            | Self::ClearRegion { origin, .. } => *origin,
            Self::RemoveByHandle { .. } => EventOrigin::Local,
        }
    }
}

/// Callback receiving manager events.
pub type EventListener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
pub(crate) struct CacheEvents {
    listeners: RwLock<Vec<EventListener>>,
}

impl CacheEvents {
    pub fn subscribe(&self, listener: EventListener) {
        self.listeners.write().push(listener);
    }

    pub fn subscribe_filtered<F>(&self, filter: fn(&CacheEvent) -> bool, listener: F)
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(move |event| {
            if filter(event) {
                listener(event);
            }
        }));
    }

    /// Fires the event built by `event`, which only runs if anyone listens.
    pub fn emit(&self, event: impl FnOnce() -> CacheEvent) {
        let listeners = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let event = event();
        for listener in &listeners {
            listener(&event);
        }
    }
}

impl Debug for CacheEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEvents")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
