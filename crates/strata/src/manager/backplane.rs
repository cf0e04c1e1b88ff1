// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Backplane traffic and backend-driven removals.

use std::sync::Arc;

use futures::FutureExt;
use strata_tier::RemovalReason;

use super::CacheManager;
use crate::backplane::{Backplane, BackplaneAction, BackplaneHandler, BackplaneMessage};
use crate::events::{CacheEvent, EventOrigin};

impl<V> CacheManager<V> {
    /// Returns the identity this manager stamps on backplane messages, if it has a backplane.
    #[must_use]
    pub fn backplane_identity(&self) -> Option<&str> {
        self.inner.backplane.as_ref().map(|link| link.identity.as_str())
    }
}

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Publishes the message built from this manager's identity.
    ///
    /// A failed publish is logged; the local mutation it announces stays in place.
    pub(super) async fn notify(&self, message: impl FnOnce(&str) -> BackplaneMessage) {
        let Some(link) = &self.inner.backplane else {
            return;
        };

        let message = message(&link.identity);
        if let Err(error) = link.backplane.publish(message).await {
            tracing::warn!(cache.name = self.name(), backplane.identity = %link.identity, %error, "backplane publish failed");
        }
    }

    pub(super) fn subscribe_to_backplane(&self) {
        let Some(link) = &self.inner.backplane else {
            return;
        };

        let manager = self.downgrade();
        let handler: BackplaneHandler = Arc::new(move |message| {
            let manager = Self::upgrade(&manager);
            async move {
                if let Some(manager) = manager {
                    manager.on_backplane_message(message).await;
                }
            }
            .boxed()
        });
        link.backplane.subscribe(handler);
    }

    pub(super) fn register_removal_listeners(&self) {
        for (index, handle) in self.handles().iter().enumerate() {
            let manager = self.downgrade();
            handle.set_removal_listener(Arc::new(move |key, region, reason| {
                if let Some(manager) = Self::upgrade(&manager) {
                    manager.on_removed_by_handle(index, key, region, reason);
                }
            }));
        }
    }

    fn on_removed_by_handle(&self, index: usize, key: &str, region: Option<&str>, reason: RemovalReason) {
        let Some(handle) = self.handles().get(index) else {
            return;
        };

        tracing::debug!(cache.name = self.name(), cache.handle = handle.name(), cache.key = key, reason = reason.as_str(), "removed by handle");
        handle.on_removed_by_backend(region, reason);
        self.inner.events.emit(|| CacheEvent::RemoveByHandle {
            key: key.to_owned(),
            region: region.map(str::to_owned),
            handle: handle.name().to_owned(),
            reason,
        });
    }

    /// Applies a peer's message to every handle except the backplane source.
    pub(crate) async fn on_backplane_message(&self, message: BackplaneMessage) {
        let Some(link) = &self.inner.backplane else {
            return;
        };
        if message.owner_identity() == link.identity {
            return;
        }

        let source = link.source;
        let region = message.region();
        tracing::debug!(
            cache.name = self.name(),
            backplane.owner = message.owner_identity(),
            backplane.action = ?message.action(),
            cache.key = message.key(),
            cache.region = region,
            "backplane message"
        );

        match (message.action(), message.key()) {
            // The new value is unknown here; the next read fetches it from the source.
            (BackplaneAction::Changed, Some(key)) => {
                self.evict_where(key, region, |index| index != source).await;
            }
            (BackplaneAction::Removed, Some(key)) => {
                self.evict_where(key, region, |index| index != source).await;
                self.inner.events.emit(|| CacheEvent::Remove {
                    key: key.to_owned(),
                    region: region.map(str::to_owned),
                    origin: EventOrigin::Remote,
                });
            }
            (BackplaneAction::Clear, _) => {
                for (index, handle) in self.handles().iter().enumerate() {
                    if index == source {
                        continue;
                    }
                    if let Err(error) = handle.clear().await {
                        tracing::warn!(cache.name = self.name(), cache.handle = handle.name(), %error, "remote clear failed");
                    }
                }
                self.inner.events.emit(|| CacheEvent::Clear {
                    origin: EventOrigin::Remote,
                });
            }
            (BackplaneAction::ClearRegion, _) => {
                let Some(region) = region else {
                    return;
                };
                for (index, handle) in self.handles().iter().enumerate() {
                    if index == source {
                        continue;
                    }
                    if let Err(error) = handle.clear_region(region).await {
                        tracing::warn!(cache.name = self.name(), cache.handle = handle.name(), %error, "remote region clear failed");
                    }
                }
                self.inner.events.emit(|| CacheEvent::ClearRegion {
                    region: region.to_owned(),
                    origin: EventOrigin::Remote,
                });
            }
            (BackplaneAction::Changed | BackplaneAction::Removed, None) => {
                tracing::warn!(cache.name = self.name(), "backplane message without a key ignored");
            }
        }
    }
}
