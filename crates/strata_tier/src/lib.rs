// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core types shared by every tier of a strata cache.
//!
//! This crate defines the [`CacheBackend`] trait that storage implementations satisfy,
//! the [`CacheItem`] value they store, the [`UpdateItemResult`] they report from
//! optimistic updates, and the [`Error`] type for fallible operations.
//!
//! # Implementing a Backend
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Mutex;
//!
//! use strata_tier::{CacheBackend, CacheItem, Error, UpdateFn, UpdateItemResult};
//!
//! #[derive(Default)]
//! struct MapBackend(Mutex<HashMap<(String, Option<String>), CacheItem<i32>>>);
//!
//! fn slot(key: &str, region: Option<&str>) -> (String, Option<String>) {
//!     (key.to_owned(), region.map(str::to_owned))
//! }
//!
//! impl CacheBackend<i32> for MapBackend {
//!     async fn add(&self, item: CacheItem<i32>) -> Result<bool, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         let slot = slot(item.key(), item.region());
//!         if map.contains_key(&slot) {
//!             return Ok(false);
//!         }
//!         map.insert(slot, item);
//!         Ok(true)
//!     }
//!
//!     async fn put(&self, item: CacheItem<i32>) -> Result<(), Error> {
//!         self.0.lock().unwrap().insert(slot(item.key(), item.region()), item);
//!         Ok(())
//!     }
//!
//!     async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<i32>>, Error> {
//!         Ok(self.0.lock().unwrap().get(&slot(key, region)).cloned())
//!     }
//!
//!     async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
//!         Ok(self.0.lock().unwrap().contains_key(&slot(key, region)))
//!     }
//!
//!     async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
//!         Ok(self.0.lock().unwrap().remove(&slot(key, region)).is_some())
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.lock().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     async fn clear_region(&self, region: &str) -> Result<(), Error> {
//!         self.0.lock().unwrap().retain(|(_, r), _| r.as_deref() != Some(region));
//!         Ok(())
//!     }
//!
//!     async fn update(
//!         &self,
//!         key: &str,
//!         region: Option<&str>,
//!         update: &UpdateFn<'_, i32>,
//!         _max_retries: u32,
//!     ) -> Result<UpdateItemResult<i32>, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         let Some(current) = map.get(&slot(key, region)) else {
//!             return Ok(UpdateItemResult::item_did_not_exist());
//!         };
//!         let Some(value) = update(current.value()) else {
//!             return Ok(UpdateItemResult::factory_returned_null(false, 1));
//!         };
//!         let written = current.with_value(value);
//!         map.insert(slot(key, region), written.clone());
//!         Ok(UpdateItemResult::success(written, false, 1))
//!     }
//! }
//! ```
//!
//! # Dynamic Dispatch
//!
//! Enable the `dynamic` feature for [`DynamicBackend`], which erases the concrete backend
//! type so heterogeneous tiers can share one list.

mod backend;
pub mod error;
mod item;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod update;

#[cfg(any(test, feature = "dynamic"))]
mod dynamic;

#[doc(inline)]
pub use backend::{CacheBackend, RemovalListener, RemovalReason};
#[cfg(any(test, feature = "dynamic"))]
#[doc(inline)]
pub use dynamic::{DynamicBackend, DynamicBackendExt};
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use item::{CacheItem, ExpirationMode, ensure_key, ensure_region};
#[doc(inline)]
pub use update::{UpdateFn, UpdateItemResult, UpdateState};
