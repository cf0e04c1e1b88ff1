// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory backends.
//!
//! The builder keeps moka's configuration types out of the public API.

use std::marker::PhantomData;

use crate::backend::MemoryBackend;

/// Builder for a [`MemoryBackend`].
///
/// Expiration is not configured here: every item carries its own expiration mode and
/// timeout, and the backend honors them per item.
///
/// # Examples
///
/// ```
/// use strata_memory::MemoryBackend;
///
/// let backend = MemoryBackend::<i32>::builder()
///     .max_capacity(1000)
///     .initial_capacity(100)
///     .name("sessions")
///     .build();
/// ```
#[derive(Debug)]
pub struct MemoryBackendBuilder<V> {
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) name: Option<String>,
    _phantom: PhantomData<V>,
}

impl<V> Default for MemoryBackendBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryBackendBuilder<V> {
    /// Creates a builder for an unbounded backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_capacity: None,
            initial_capacity: None,
            name: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of items.
    ///
    /// Once reached, items are evicted using moka's `TinyLFU` policy and reported to the
    /// removal listener as [`RemovalReason::Evicted`](strata_tier::RemovalReason::Evicted).
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the pre-allocation hint.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets a name that may appear in debugging output.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the backend.
    #[must_use]
    pub fn build(self) -> MemoryBackend<V>
    where
        V: Clone + Send + Sync + 'static,
    {
        MemoryBackend::from_builder(&self)
    }
}
