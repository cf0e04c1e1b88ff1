// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache manager builder.
//!
//! Handles are supplied as typed backends, in priority order; nothing is discovered at
//! runtime. [`CacheManagerBuilder::build`] validates the whole configuration before any
//! handle is created.

use std::fmt::Debug;
use std::sync::Arc;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::{Meter, MeterProvider};
use strata_tier::{CacheBackend, DynamicBackend, Error, Result};
#[cfg(feature = "memory")]
use strata_memory::MemoryBackend;
use tick::Clock;

use crate::backplane::{Backplane, DynBackplane, is_valid_identity};
use crate::config::{CacheHandleConfiguration, CacheManagerConfiguration, DEFAULT_MAX_RETRIES, UpdateMode};
use crate::handle::CacheHandle;
use crate::manager::CacheManager;
use crate::telemetry::CacheTelemetry;

/// Builder for a [`CacheManager`].
///
/// Created by [`CacheManager::builder`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use strata::{CacheHandleConfiguration, CacheManager, ExpirationMode, InProcessBus, MemoryBackend, UpdateMode};
/// use tick::Clock;
///
/// let shared = MemoryBackend::<String>::new();
/// let bus = InProcessBus::new();
///
/// let cache = CacheManager::<String>::builder("sessions", Clock::new_frozen())
///     .update_mode(UpdateMode::Up)
///     .max_retries(10)
///     .with_memory_handle(
///         CacheHandleConfiguration::new("local").with_expiration(ExpirationMode::Sliding, Duration::from_secs(30)),
///     )
///     .with_handle(CacheHandleConfiguration::new("shared").as_backplane_source(), shared)
///     .with_backplane(bus.backplane())
///     .build()?;
///
/// assert_eq!(cache.handles().len(), 2);
/// # Ok::<(), strata::Error>(())
/// ```
pub struct CacheManagerBuilder<V> {
    name: String,
    clock: Clock,
    update_mode: UpdateMode,
    max_retries: u32,
    handles: Vec<(CacheHandleConfiguration, DynamicBackend<V>)>,
    backplane: Option<Arc<DynBackplane<'static>>>,
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<Meter>,
}

impl<V> CacheManagerBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(name: impl Into<String>, clock: Clock) -> Self {
        Self {
            name: name.into(),
            clock,
            update_mode: UpdateMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            handles: Vec::new(),
            backplane: None,
            logging_enabled: false,
            #[cfg(any(feature = "metrics", test))]
            meter: None,
        }
    }

    /// Sets how read hits propagate to faster handles. Defaults to [`UpdateMode::Up`].
    #[must_use]
    pub fn update_mode(mut self, mode: UpdateMode) -> Self {
        self.update_mode = mode;
        self
    }

    /// Sets the retry budget of updates. Defaults to 50.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Appends a handle backed by `backend`.
    ///
    /// Handles are ordered as added: the first is read first, the last is authoritative.
    #[must_use]
    pub fn with_handle<B>(mut self, config: CacheHandleConfiguration, backend: B) -> Self
    where
        B: CacheBackend<V> + 'static,
    {
        self.handles.push((config, DynamicBackend::new(backend)));
        self
    }

    /// Appends a handle backed by a new unbounded [`MemoryBackend`].
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn with_memory_handle(self, config: CacheHandleConfiguration) -> Self {
        self.with_handle(config, MemoryBackend::<V>::new())
    }

    /// Connects the manager to peers through `backplane`.
    ///
    /// The last handle must then be marked as the backplane source, and the backplane's
    /// identity must be usable on the wire.
    #[must_use]
    pub fn with_backplane<B>(mut self, backplane: B) -> Self
    where
        B: Backplane + 'static,
    {
        self.backplane = Some(DynBackplane::new_arc(backplane));
        self
    }

    /// Emits a `tracing` event for every handle operation.
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    /// Records handle metrics through a meter created from `meter_provider`.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn with_meter_provider(mut self, meter_provider: &dyn MeterProvider) -> Self {
        self.meter = Some(crate::telemetry::metrics::create_meter(meter_provider));
        self
    }

    /// Validates the configuration and creates the manager.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if there are no handles, handle names are empty or
    /// repeated, a handle expiration lacks its timeout, or the backplane source rules are
    /// broken: with a backplane exactly one handle, the last, is the source; without one no
    /// handle is. A backplane identity that is empty or contains `:` is a configuration
    /// error too.
    pub fn build(self) -> Result<CacheManager<V>> {
        let (handle_configs, backends): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        let config = CacheManagerConfiguration {
            name: self.name,
            update_mode: self.update_mode,
            max_retries: self.max_retries,
            handles: handle_configs,
            has_backplane: self.backplane.is_some(),
        };
        config.validate()?;

        let backplane = match self.backplane {
            Some(backplane) => {
                let identity = backplane.identity();
                if !is_valid_identity(&identity) {
                    return Err(Error::configuration(format!(
                        "backplane identity '{identity}' of cache '{}' must be non-empty and must not contain ':'",
                        config.name()
                    )));
                }
                Some((backplane, identity))
            }
            None => None,
        };

        #[cfg(any(feature = "metrics", test))]
        let telemetry = match &self.meter {
            Some(meter) => CacheTelemetry::with_meter(config.name(), self.logging_enabled, meter),
            None => CacheTelemetry::new(config.name(), self.logging_enabled),
        };
        #[cfg(not(any(feature = "metrics", test)))]
        let telemetry = CacheTelemetry::new(config.name(), self.logging_enabled);

        let handles = config
            .handles()
            .iter()
            .cloned()
            .zip(backends)
            .map(|(handle_config, backend)| CacheHandle::new(handle_config, backend, self.clock.clone(), telemetry.clone()))
            .collect();

        tracing::debug!(cache.name = config.name(), handles = config.handles().len(), backplane = config.has_backplane(), "cache manager built");
        Ok(CacheManager::from_parts(config, handles, backplane, self.clock))
    }
}

impl<V> Debug for CacheManagerBuilder<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManagerBuilder")
            .field("name", &self.name)
            .field("update_mode", &self.update_mode)
            .field("max_retries", &self.max_retries)
            .field("handles", &self.handles.iter().map(|(config, _)| config.name()).collect::<Vec<_>>())
            .field("backplane", &self.backplane.is_some())
            .finish_non_exhaustive()
    }
}
