// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Attribute keys shared by handle metrics and handle log events.
//!
//! The `tracing` fields emitted in `cache.rs` and by the manager use the same names.

/// Name of the cache manager.
#[cfg(any(feature = "metrics", test))]
pub(crate) const CACHE_NAME: &str = "cache.name";

/// Name of the handle within its manager.
#[cfg(any(feature = "metrics", test))]
pub(crate) const CACHE_HANDLE: &str = "cache.handle";

#[cfg(any(feature = "metrics", test))]
pub(crate) const CACHE_OPERATION: &str = "cache.operation";

#[cfg(any(feature = "metrics", test))]
pub(crate) const CACHE_ACTIVITY: &str = "cache.activity";

#[cfg(test)]
pub(crate) const CACHE_DURATION: &str = "cache.duration_ns";

/// Message of every handle log event.
#[cfg(test)]
pub(crate) const HANDLE_EVENT_MESSAGE: &str = "cache.event";
