// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    ops::Deref,
    time::{Duration, SystemTime},
};

use crate::{Error, Result};

/// How an item expires.
///
/// [`ExpirationMode::Default`] defers to the configuration of the handle that stores the item;
/// the other modes are explicit and override any handle default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ExpirationMode {
    /// Use the expiration configured on the storing handle.
    #[default]
    Default,
    /// Never expire.
    None,
    /// Expire after the timeout has elapsed since the last access.
    Sliding,
    /// Expire once the timeout has elapsed since the item was created.
    Absolute,
}

impl ExpirationMode {
    /// Returns `true` for modes that need a non-zero timeout.
    #[must_use]
    pub fn requires_timeout(self) -> bool {
        matches!(self, Self::Sliding | Self::Absolute)
    }
}

/// A cached value together with its identity and expiration policy.
///
/// The pair `(key, region)` identifies the logical entry. Items are treated as values:
/// the `with_*` methods return modified copies and leave `self` untouched. Timestamps are
/// unset until the item is first stored; the storing cache stamps them from its clock.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata_tier::{CacheItem, ExpirationMode};
///
/// let item = CacheItem::new("user:1", 42)?;
/// assert_eq!(*item.value(), 42);
/// assert_eq!(item.expiration_mode(), ExpirationMode::Default);
///
/// let sliding = item.with_sliding_expiration(Duration::from_secs(30))?;
/// assert_eq!(sliding.expiration_mode(), ExpirationMode::Sliding);
/// assert_eq!(item.expiration_mode(), ExpirationMode::Default);
/// # Ok::<(), strata_tier::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheItem<V> {
    key: String,
    region: Option<String>,
    value: V,
    created_utc: Option<SystemTime>,
    last_accessed_utc: Option<SystemTime>,
    expiration_mode: ExpirationMode,
    expiration_timeout: Duration,
    uses_expiration_defaults: bool,
}

impl<V> CacheItem<V> {
    /// Creates an item without a region that uses the handle's default expiration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `key` is empty or whitespace.
    pub fn new(key: impl Into<String>, value: V) -> Result<Self> {
        Self::create(key.into(), None, value)
    }

    /// Creates an item stored in `region`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `key` or `region` is empty or whitespace.
    pub fn in_region(key: impl Into<String>, region: impl Into<String>, value: V) -> Result<Self> {
        Self::create(key.into(), Some(region.into()), value)
    }

    fn create(key: String, region: Option<String>, value: V) -> Result<Self> {
        ensure_key(&key)?;
        ensure_region(region.as_deref())?;
        Ok(Self {
            key,
            region,
            value,
            created_utc: None,
            last_accessed_utc: None,
            expiration_mode: ExpirationMode::Default,
            expiration_timeout: Duration::ZERO,
            uses_expiration_defaults: false,
        })
    }

    /// Returns the key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the region, if any.
    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the item and returns the inner value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns when the item was first stored, or `None` if it hasn't been.
    #[must_use]
    pub fn created_utc(&self) -> Option<SystemTime> {
        self.created_utc
    }

    /// Returns when the item was last read, or `None` if it hasn't been stored yet.
    #[must_use]
    pub fn last_accessed_utc(&self) -> Option<SystemTime> {
        self.last_accessed_utc
    }

    /// Records a read access.
    pub fn set_last_accessed_utc(&mut self, accessed: SystemTime) {
        self.last_accessed_utc = Some(accessed);
    }

    /// Stamps the creation time, and the last access with it, unless already set.
    ///
    /// Called when an item is stored; a copy moved between tiers keeps its original stamps.
    pub fn ensure_created_utc(&mut self, now: SystemTime) {
        let created = *self.created_utc.get_or_insert(now);
        self.last_accessed_utc.get_or_insert(created);
    }

    /// Returns the expiration mode.
    #[must_use]
    pub fn expiration_mode(&self) -> ExpirationMode {
        self.expiration_mode
    }

    /// Returns the expiration timeout. Zero unless the mode is sliding or absolute.
    #[must_use]
    pub fn expiration_timeout(&self) -> Duration {
        self.expiration_timeout
    }

    /// Returns `true` if the expiration was filled in from a handle's defaults rather than
    /// chosen for this item explicitly.
    #[must_use]
    pub fn uses_expiration_defaults(&self) -> bool {
        self.uses_expiration_defaults
    }

    /// Returns a copy holding `value`, keeping identity, timestamps and expiration.
    #[must_use]
    pub fn with_value(&self, value: V) -> Self {
        Self {
            key: self.key.clone(),
            region: self.region.clone(),
            value,
            created_utc: self.created_utc,
            last_accessed_utc: self.last_accessed_utc,
            expiration_mode: self.expiration_mode,
            expiration_timeout: self.expiration_timeout,
            uses_expiration_defaults: self.uses_expiration_defaults,
        }
    }
}

impl<V: Clone> CacheItem<V> {
    /// Returns a copy with an explicit expiration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `mode` is sliding or absolute and `timeout` is zero.
    pub fn with_expiration(&self, mode: ExpirationMode, timeout: Duration) -> Result<Self> {
        if mode.requires_timeout() && timeout.is_zero() {
            return Err(Error::invalid_argument(
                "expiration timeout must be greater than zero for sliding or absolute expiration",
            ));
        }
        let timeout = if mode.requires_timeout() { timeout } else { Duration::ZERO };
        Ok(Self {
            expiration_mode: mode,
            expiration_timeout: timeout,
            uses_expiration_defaults: false,
            ..self.clone()
        })
    }

    /// Returns a copy that expires `timeout` after creation.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `timeout` is zero.
    pub fn with_absolute_expiration(&self, timeout: Duration) -> Result<Self> {
        self.with_expiration(ExpirationMode::Absolute, timeout)
    }

    /// Returns a copy that expires after `timeout` without access.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `timeout` is zero.
    pub fn with_sliding_expiration(&self, timeout: Duration) -> Result<Self> {
        self.with_expiration(ExpirationMode::Sliding, timeout)
    }

    /// Returns a copy that never expires.
    #[must_use]
    pub fn with_no_expiration(&self) -> Self {
        Self {
            expiration_mode: ExpirationMode::None,
            expiration_timeout: Duration::ZERO,
            uses_expiration_defaults: false,
            ..self.clone()
        }
    }

    /// Returns a copy that defers to the storing handle's expiration.
    #[must_use]
    pub fn with_default_expiration(&self) -> Self {
        Self {
            expiration_mode: ExpirationMode::Default,
            expiration_timeout: Duration::ZERO,
            uses_expiration_defaults: false,
            ..self.clone()
        }
    }

    /// Returns a copy whose expiration was resolved from a handle's configuration.
    ///
    /// The copy is flagged with [`uses_expiration_defaults`](Self::uses_expiration_defaults),
    /// so another handle re-resolves it against its own defaults.
    #[must_use]
    pub fn with_expiration_defaults(&self, mode: ExpirationMode, timeout: Duration) -> Self {
        Self {
            expiration_mode: mode,
            expiration_timeout: timeout,
            uses_expiration_defaults: true,
            ..self.clone()
        }
    }

    /// Returns a copy with a different creation time.
    #[must_use]
    pub fn with_created_utc(&self, created: SystemTime) -> Self {
        Self {
            created_utc: Some(created),
            ..self.clone()
        }
    }
}

impl<V> Deref for CacheItem<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// Validates a cache key.
///
/// # Errors
///
/// Returns an invalid-argument error if `key` is empty or whitespace.
pub fn ensure_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::invalid_argument("key must not be empty or whitespace"));
    }
    Ok(())
}

/// Validates an optional region. `None` is valid; an empty or whitespace region is not.
///
/// # Errors
///
/// Returns an invalid-argument error if `region` is present and empty or whitespace.
pub fn ensure_region(region: Option<&str>) -> Result<()> {
    match region {
        Some(region) if region.trim().is_empty() => Err(Error::invalid_argument(
            "region must not be empty or whitespace; use no region instead",
        )),
        _ => Ok(()),
    }
}
