// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Key enumeration and expiration changes.

use std::time::{Duration, SystemTime};

use strata_tier::{Error, ExpirationMode, Result, ensure_key, ensure_region};

use super::CacheManager;
use crate::pattern::KeyPattern;

impl<V> CacheManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Lists the keys in `region` that match the glob `pattern`.
    ///
    /// Only the last handle that can enumerate keys is asked. See [`KeyPattern`] for the
    /// pattern syntax.
    ///
    /// # Errors
    ///
    /// Returns an unsupported-operation error if no handle can enumerate keys, an
    /// invalid-argument error for an empty pattern or region, or the error of the handle.
    pub async fn find_keys(&self, pattern: &str, region: Option<&str>) -> Result<Vec<String>> {
        let pattern = KeyPattern::new(pattern)?;
        ensure_region(region)?;

        let Some(handle) = self.handles().iter().rev().find(|handle| handle.supports_key_enumeration()) else {
            return Err(Error::unsupported(format!(
                "no handle of cache '{}' can enumerate keys",
                self.name()
            )));
        };

        let mut keys = handle.keys(region).await?;
        keys.retain(|key| pattern.matches(key));
        Ok(keys)
    }

    /// Lists every key outside any region.
    ///
    /// # Errors
    ///
    /// See [`find_keys`](Self::find_keys).
    pub async fn get_all_keys(&self) -> Result<Vec<String>> {
        self.find_keys("*", None).await
    }

    /// Changes the expiration of a cached item.
    ///
    /// The item is read, given the new expiration and written back to every handle.
    /// Returns `false` if no handle holds the key. [`ExpirationMode::Default`] hands the item
    /// back to each handle's configured expiration.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error for an empty key or region, or when `mode` is
    /// sliding or absolute and `timeout` is zero. Also returns handle errors.
    pub async fn expire(&self, key: &str, region: Option<&str>, mode: ExpirationMode, timeout: Duration) -> Result<bool> {
        ensure_key(key)?;
        ensure_region(region)?;
        if mode.requires_timeout() && timeout.is_zero() {
            return Err(Error::invalid_argument(format!("{mode:?} expiration needs a timeout greater than zero")));
        }

        let Some(item) = self.get_cache_item(key, region).await? else {
            return Ok(false);
        };
        let mut item = item.with_expiration(mode, timeout)?;
        if mode == ExpirationMode::Absolute {
            // Absolute expiration counts from creation.
            item = item.with_created_utc(self.clock().system_time());
        }
        self.put(item).await?;
        Ok(true)
    }

    /// Makes the item expire `timeout` from now.
    ///
    /// # Errors
    ///
    /// See [`expire`](Self::expire).
    pub async fn expire_absolute(&self, key: &str, region: Option<&str>, timeout: Duration) -> Result<bool> {
        self.expire(key, region, ExpirationMode::Absolute, timeout).await
    }

    /// Makes the item expire at `deadline`, as told by the manager's clock.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `deadline` is not in the future, or any error of
    /// [`expire`](Self::expire).
    pub async fn expire_absolute_at(&self, key: &str, region: Option<&str>, deadline: SystemTime) -> Result<bool> {
        let timeout = deadline
            .duration_since(self.clock().system_time())
            .map_err(|_elapsed| Error::invalid_argument("expiration deadline lies in the past"))?;
        self.expire(key, region, ExpirationMode::Absolute, timeout).await
    }

    /// Makes the item expire after `timeout` without access.
    ///
    /// # Errors
    ///
    /// See [`expire`](Self::expire).
    pub async fn expire_sliding(&self, key: &str, region: Option<&str>, timeout: Duration) -> Result<bool> {
        self.expire(key, region, ExpirationMode::Sliding, timeout).await
    }

    /// Makes the item never expire.
    ///
    /// # Errors
    ///
    /// See [`expire`](Self::expire).
    pub async fn remove_expiration(&self, key: &str, region: Option<&str>) -> Result<bool> {
        self.expire(key, region, ExpirationMode::None, Duration::ZERO).await
    }
}
