// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Multi-tier cache coordination.
//!
//! A [`CacheManager`] presents one logical cache over an ordered list of cache handles,
//! from the fastest (index 0, typically in-process memory) to the most authoritative (the
//! last, typically a shared store). The manager keeps the handles consistent:
//!
//! - reads stop at the first handle holding the key and, with [`UpdateMode::Up`], copy the
//!   item into every faster handle;
//! - adds start at the authoritative end and evict the key everywhere else when a handle
//!   already holds it;
//! - updates run an optimistic compare-and-swap loop on the authoritative handle and evict
//!   stale copies from the faster ones;
//! - with a [`Backplane`], every local mutation is announced to peer managers, whose local
//!   copies are evicted in response.
//!
//! Every mutation follows the same order: local handles change first, then peers are
//! notified, then local [`CacheEvent`] listeners run.
//!
//! Timestamps and absolute expiration follow the [`tick::Clock`] given to
//! [`CacheManager::builder`], so tests can drive time with `tick::ClockControl`.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use futures::executor::block_on;
//! use strata::{CacheHandleConfiguration, CacheManager, ExpirationMode, InProcessBus, MemoryBackend};
//! use tick::Clock;
//!
//! # block_on(async {
//! let bus = InProcessBus::new();
//! let shared = MemoryBackend::<u64>::new();
//!
//! let peer = |name: &str| {
//!     CacheManager::<u64>::builder(name, Clock::new_frozen())
//!         .with_memory_handle(
//!             CacheHandleConfiguration::new("local").with_expiration(ExpirationMode::Sliding, Duration::from_secs(60)),
//!         )
//!         .with_handle(CacheHandleConfiguration::new("shared").as_backplane_source(), shared.clone())
//!         .with_backplane(bus.backplane())
//!         .build()
//! };
//! let first = peer("first")?;
//! let second = peer("second")?;
//!
//! first.put_value("visits", None, 1).await?;
//! assert_eq!(second.get("visits", None).await?, Some(1));
//!
//! // The update evicts the copy cached locally by `second`.
//! first.update("visits", None, |v| Some(v + 1)).await?;
//! assert_eq!(second.get("visits", None).await?, Some(2));
//! # Ok::<(), strata::Error>(())
//! # }).unwrap();
//! ```
//!
//! # Features
//!
//! - `memory` (default): [`MemoryBackend`] and [`CacheManagerBuilder::with_memory_handle`].
//! - `metrics`: OpenTelemetry instruments through `CacheManagerBuilder::with_meter_provider`.
//! - `test-util`: the mock backend of `strata_tier::testing`.

pub mod backplane;
mod blocking;
mod builder;
mod config;
mod events;
mod handle;
mod manager;
mod pattern;
mod stats;
mod telemetry;

#[doc(inline)]
pub use backplane::{Backplane, BackplaneAction, BackplaneHandler, BackplaneMessage, ChangeAction, InProcessBackplane, InProcessBus};
pub use blocking::BlockingCacheManager;
pub use builder::CacheManagerBuilder;
pub use config::{CacheHandleConfiguration, CacheManagerConfiguration, DEFAULT_MAX_RETRIES, UpdateMode};
pub use events::{CacheEvent, EventListener, EventOrigin};
pub use handle::CacheHandle;
pub use manager::CacheManager;
pub use pattern::KeyPattern;
pub use stats::{CacheStats, CacheStatsCounter};
#[cfg(feature = "memory")]
#[doc(inline)]
pub use strata_memory::MemoryBackend;
#[doc(inline)]
pub use strata_tier::{
    CacheBackend, CacheItem, Error, ErrorKind, ExpirationMode, RemovalReason, Result, UpdateFn, UpdateItemResult, UpdateState,
};
