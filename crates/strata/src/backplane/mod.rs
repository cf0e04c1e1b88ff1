// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The pub/sub channel that keeps cache managers in different processes consistent.
//!
//! A manager publishes a [`BackplaneMessage`] for every local mutation and evicts its own
//! copies when a peer's message arrives. The transport is pluggable through [`Backplane`];
//! [`InProcessBus`] connects managers that live in one process.

use std::sync::Arc;

use futures::future::BoxFuture;
use strata_tier::Result;

mod in_process;
mod message;

pub use in_process::{InProcessBackplane, InProcessBus};
pub use message::{BackplaneAction, BackplaneMessage, ChangeAction};

/// Callback a manager registers to receive messages from its peers.
pub type BackplaneHandler = Arc<dyn Fn(BackplaneMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Trait for backplane transports.
///
/// # Examples
///
/// ```
/// use parking_lot::Mutex;
/// use strata::{Backplane, BackplaneHandler, BackplaneMessage, Result};
///
/// /// Records what would be sent over the wire.
/// #[derive(Default)]
/// struct Recording(Mutex<Vec<String>>);
///
/// impl Backplane for Recording {
///     fn identity(&self) -> String {
///         "recording".to_string()
///     }
///
///     async fn publish(&self, message: BackplaneMessage) -> Result<()> {
///         self.0.lock().push(message.serialize());
///         Ok(())
///     }
///
///     fn subscribe(&self, _handler: BackplaneHandler) {}
/// }
/// ```
#[dynosaur::dynosaur(pub(crate) DynBackplane = dyn(box) Backplane, bridge(none))]
pub trait Backplane: Send + Sync {
    /// Returns the identity stamped on outbound messages.
    ///
    /// Must be non-empty and must not contain `:`, the wire format's separator.
    /// [`CacheManagerBuilder::build`](crate::CacheManagerBuilder::build) rejects any other
    /// identity with a configuration error.
    fn identity(&self) -> String;

    /// Sends `message` to every peer.
    fn publish(&self, message: BackplaneMessage) -> impl Future<Output = Result<()>> + Send;

    /// Registers the handler that receives messages published by peers.
    fn subscribe(&self, handler: BackplaneHandler);
}

/// Returns `true` if `identity` can be stamped on wire messages.
pub(crate) fn is_valid_identity(identity: &str) -> bool {
    !identity.is_empty() && !identity.contains(':')
}
