// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Telemetry recording for the handles of one cache manager.

use std::sync::Arc;
use std::time::Duration;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{KeyValue, metrics::Meter};
use tracing::Level;

#[cfg(any(feature = "metrics", test))]
use crate::telemetry::{attributes, metrics::HandleInstruments};
use crate::telemetry::{CacheActivity, CacheOperation};

/// Records handle operations under the name of the manager that owns the handles.
#[derive(Clone, Debug, Default)]
pub(crate) struct CacheTelemetry {
    inner: Arc<CacheTelemetryInner>,
}

#[derive(Debug, Default)]
struct CacheTelemetryInner {
    cache_name: String,
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<HandleInstruments>,
}

impl CacheTelemetry {
    /// Creates a collector that only logs.
    #[must_use]
    pub fn new(cache_name: impl Into<String>, logging_enabled: bool) -> Self {
        Self {
            inner: Arc::new(CacheTelemetryInner {
                cache_name: cache_name.into(),
                logging_enabled,
                ..CacheTelemetryInner::default()
            }),
        }
    }

    /// Creates a collector that logs and records metrics through `meter`.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn with_meter(cache_name: impl Into<String>, logging_enabled: bool, meter: &Meter) -> Self {
        Self {
            inner: Arc::new(CacheTelemetryInner {
                cache_name: cache_name.into(),
                logging_enabled,
                instruments: Some(HandleInstruments::new(meter)),
            }),
        }
    }

    /// Returns `true` if the collector records anything at all.
    pub fn is_enabled(&self) -> bool {
        #[cfg(any(feature = "metrics", test))]
        if self.inner.instruments.is_some() {
            return true;
        }
        self.inner.logging_enabled
    }

    #[cfg(any(feature = "metrics", test))]
    fn handle_attributes(&self, handle: &str) -> [KeyValue; 2] {
        [
            KeyValue::new(attributes::CACHE_NAME, self.inner.cache_name.clone()),
            KeyValue::new(attributes::CACHE_HANDLE, handle.to_owned()),
        ]
    }

    /// Records one operation of `handle`.
    #[inline]
    pub fn record(&self, handle: &str, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.inner.instruments {
            let [cache, handle_attr] = self.handle_attributes(handle);
            let attrs = [
                cache,
                handle_attr,
                KeyValue::new(attributes::CACHE_OPERATION, operation.as_str()),
                KeyValue::new(attributes::CACHE_ACTIVITY, activity.as_str()),
            ];

            instruments.operations.add(1, &attrs);
            if let Some(d) = duration {
                instruments.duration.record(d.as_secs_f64(), &attrs);
            }
        }

        if self.inner.logging_enabled {
            self.emit(handle, operation, activity, duration);
        }
    }

    /// Records the number of items `handle` holds.
    #[inline]
    pub fn record_size(&self, handle: &str, size: u64) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.inner.instruments {
            instruments.items.record(size, &self.handle_attributes(handle));
        }

        #[cfg(not(any(feature = "metrics", test)))]
        let _ = (handle, size);
    }

    fn emit(&self, handle: &str, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        let cache_name = self.inner.cache_name.as_str();
        let op = operation.as_str();
        let ev = activity.as_str();
        let duration_ns = duration.map(|d| d.as_nanos());

        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.handle = handle,
                    cache.operation = op,
                    cache.activity = ev,
                    cache.duration_ns = ?duration_ns,
                    "cache.event"
                )
            };
        }

        let level = activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}
