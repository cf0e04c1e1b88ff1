// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_tier::{Error, Result};
use uuid::Uuid;

use crate::backplane::{Backplane, BackplaneHandler, BackplaneMessage, is_valid_identity};

type Subscribers = Arc<RwLock<Vec<Subscriber>>>;

struct Subscriber {
    backplane: Uuid,
    identity: String,
    handler: BackplaneHandler,
}

/// A message bus shared by backplanes in one process.
///
/// Messages are serialized on publish and parsed again for every subscriber, so they go
/// through the same wire format a network transport would use. Delivery completes before
/// `publish` returns. Dropping a backplane, which happens when its manager is dropped,
/// unregisters its handlers.
///
/// # Examples
///
/// ```
/// use strata::{Backplane, InProcessBus};
///
/// let bus = InProcessBus::new();
/// let first = bus.backplane();
/// let second = bus.backplane_with_identity("node-2")?;
///
/// assert_ne!(first.identity(), second.identity());
/// # Ok::<(), strata::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct InProcessBus {
    subscribers: Subscribers,
}

impl InProcessBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backplane on this bus with a random identity.
    #[must_use]
    pub fn backplane(&self) -> InProcessBackplane {
        InProcessBackplane {
            id: Uuid::new_v4(),
            identity: Uuid::new_v4().simple().to_string(),
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Creates a backplane on this bus with the given identity.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `identity` is empty or contains `:`.
    pub fn backplane_with_identity(&self, identity: impl Into<String>) -> Result<InProcessBackplane> {
        let identity = identity.into();
        if !is_valid_identity(&identity) {
            return Err(Error::invalid_argument(format!(
                "backplane identity '{identity}' must be non-empty and must not contain ':'"
            )));
        }

        Ok(InProcessBackplane {
            id: Uuid::new_v4(),
            identity,
            subscribers: Arc::clone(&self.subscribers),
        })
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Debug for InProcessBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// One participant of an [`InProcessBus`].
pub struct InProcessBackplane {
    id: Uuid,
    identity: String,
    subscribers: Subscribers,
}

impl Drop for InProcessBackplane {
    fn drop(&mut self) {
        self.subscribers.write().retain(|subscriber| subscriber.backplane != self.id);
    }
}

impl Debug for InProcessBackplane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBackplane")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Backplane for InProcessBackplane {
    fn identity(&self) -> String {
        self.identity.clone()
    }

    async fn publish(&self, message: BackplaneMessage) -> Result<()> {
        let wire = message.serialize();
        let peers: Vec<BackplaneHandler> = self
            .subscribers
            .read()
            .iter()
            .filter(|subscriber| subscriber.identity != self.identity)
            .map(|subscriber| Arc::clone(&subscriber.handler))
            .collect();

        tracing::trace!(backplane.identity = %self.identity, backplane.peers = peers.len(), message = %wire, "publishing");

        for handler in peers {
            handler(BackplaneMessage::deserialize(&wire)?).await;
        }
        Ok(())
    }

    fn subscribe(&self, handler: BackplaneHandler) {
        self.subscribers.write().push(Subscriber {
            backplane: self.id,
            identity: self.identity.clone(),
            handler,
        });
    }
}
