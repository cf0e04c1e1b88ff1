// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-memory cache backend backed by moka.
//!
//! [`MemoryBackend`] implements [`CacheBackend`](strata_tier::CacheBackend) on top of a
//! concurrent moka cache. Each item expires according to its own expiration mode:
//! sliding items are refreshed on every read, absolute items expire a fixed time after
//! they were written, and items without expiration stay until removed or evicted.
//!
//! Items the backend drops on its own, through expiration or capacity eviction, are
//! reported to the registered removal listener.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use strata_memory::MemoryBackend;
//! use strata_tier::{CacheBackend, CacheItem};
//!
//! # futures::executor::block_on(async {
//! let backend = MemoryBackend::<String>::builder().max_capacity(1000).build();
//!
//! let item = CacheItem::new("greeting", "hello".to_string())?
//!     .with_sliding_expiration(Duration::from_secs(300))?;
//! backend.put(item).await?;
//!
//! assert!(backend.exists("greeting", None).await?);
//! # Ok::<(), strata_tier::Error>(())
//! # }).unwrap();
//! ```

pub mod backend;
pub mod builder;

#[doc(inline)]
pub use backend::MemoryBackend;
#[doc(inline)]
pub use builder::MemoryBackendBuilder;
