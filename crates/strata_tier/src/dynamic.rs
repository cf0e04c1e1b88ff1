// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Type-erased backend wrapper.

use std::{fmt::Debug, sync::Arc};

use crate::{CacheBackend, CacheItem, Error, RemovalListener, UpdateFn, UpdateItemResult, backend::DynCacheBackend};

/// Extension trait for converting any [`CacheBackend`] into a [`DynamicBackend`].
///
/// # Examples
///
/// ```
/// use strata_tier::{CacheBackend, DynamicBackend, DynamicBackendExt};
///
/// fn erase<B>(backend: B) -> DynamicBackend<i32>
/// where
///     B: CacheBackend<i32> + 'static,
/// {
///     backend.into_dynamic()
/// }
/// ```
pub trait DynamicBackendExt<V>: Sized {
    /// Converts this backend into a [`DynamicBackend`].
    fn into_dynamic(self) -> DynamicBackend<V>;
}

impl<V, B> DynamicBackendExt<V> for B
where
    B: CacheBackend<V> + 'static,
{
    fn into_dynamic(self) -> DynamicBackend<V> {
        DynamicBackend::new(self)
    }
}

/// A clonable, type-erased cache backend.
///
/// A cache manager owns an ordered list of heterogeneous backends, so each one is erased
/// behind this wrapper. Clones share the same underlying backend.
pub struct DynamicBackend<V>(Arc<DynCacheBackend<'static, V>>);

impl<V> DynamicBackend<V> {
    /// Erases `backend`.
    pub fn new<B>(backend: B) -> Self
    where
        B: CacheBackend<V> + 'static,
    {
        Self(DynCacheBackend::new_arc(backend))
    }
}

impl<V> Debug for DynamicBackend<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend").finish_non_exhaustive()
    }
}

impl<V> Clone for DynamicBackend<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<V: Send> CacheBackend<V> for DynamicBackend<V> {
    async fn add(&self, item: CacheItem<V>) -> Result<bool, Error> {
        self.0.add(item).await
    }

    async fn put(&self, item: CacheItem<V>) -> Result<(), Error> {
        self.0.put(item).await
    }

    async fn get(&self, key: &str, region: Option<&str>) -> Result<Option<CacheItem<V>>, Error> {
        self.0.get(key, region).await
    }

    async fn exists(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        self.0.exists(key, region).await
    }

    async fn remove(&self, key: &str, region: Option<&str>) -> Result<bool, Error> {
        self.0.remove(key, region).await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.0.clear().await
    }

    async fn clear_region(&self, region: &str) -> Result<(), Error> {
        self.0.clear_region(region).await
    }

    async fn update(
        &self,
        key: &str,
        region: Option<&str>,
        update: &UpdateFn<'_, V>,
        max_retries: u32,
    ) -> Result<UpdateItemResult<V>, Error> {
        self.0.update(key, region, update, max_retries).await
    }

    async fn keys(&self, region: Option<&str>) -> Result<Vec<String>, Error> {
        self.0.keys(region).await
    }

    fn supports_key_enumeration(&self) -> bool {
        self.0.supports_key_enumeration()
    }

    fn set_removal_listener(&self, listener: RemovalListener) {
        self.0.set_removal_listener(listener);
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }

    fn is_empty(&self) -> Option<bool> {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::testing::MockBackend;

    #[test]
    fn forwards_to_inner_backend() {
        let mock = MockBackend::<i32>::new();
        let dynamic = mock.clone().into_dynamic();

        block_on(async {
            assert!(dynamic.add(CacheItem::new("key", 1).unwrap()).await.unwrap());
            assert!(!dynamic.add(CacheItem::new("key", 2).unwrap()).await.unwrap());
            assert_eq!(*dynamic.get("key", None).await.unwrap().unwrap().value(), 1);
            assert!(dynamic.remove("key", None).await.unwrap());
        });

        assert_eq!(mock.operations().len(), 4);
        assert_eq!(dynamic.len(), Some(0));
        assert!(dynamic.supports_key_enumeration());
    }

    #[test]
    fn clones_share_state() {
        let dynamic = MockBackend::<i32>::new().into_dynamic();
        let clone = dynamic.clone();

        block_on(dynamic.put(CacheItem::new("key", 1).unwrap())).unwrap();
        assert!(block_on(clone.exists("key", None)).unwrap());
    }
}
