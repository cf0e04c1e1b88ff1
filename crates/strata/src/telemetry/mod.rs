// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-handle operation telemetry.
//!
//! Every handle operation is recorded as an `(operation, activity)` pair. Records are
//! emitted as structured `tracing` events when logging is enabled and, with the `metrics`
//! feature, counted through OpenTelemetry instruments.

use tracing::Level;

pub(crate) mod attributes;
pub(crate) mod cache;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

pub(crate) use cache::CacheTelemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Add,
    Put,
    Get,
    Exists,
    Remove,
    Clear,
    ClearRegion,
    Update,
    Keys,
    Evict,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "cache.add",
            Self::Put => "cache.put",
            Self::Get => "cache.get",
            Self::Exists => "cache.exists",
            Self::Remove => "cache.remove",
            Self::Clear => "cache.clear",
            Self::ClearRegion => "cache.clear_region",
            Self::Update => "cache.update",
            Self::Keys => "cache.keys",
            Self::Evict => "cache.evict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Ok,
    Inserted,
    Rejected,
    Removed,
    Updated,
    Declined,
    Conflict,
    Expired,
    Evicted,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Ok => "cache.ok",
            Self::Inserted => "cache.inserted",
            Self::Rejected => "cache.rejected",
            Self::Removed => "cache.removed",
            Self::Updated => "cache.updated",
            Self::Declined => "cache.declined",
            Self::Conflict => "cache.conflict",
            Self::Expired => "cache.expired",
            Self::Evicted => "cache.evicted",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss | Self::Ok | Self::Rejected | Self::Declined => Level::DEBUG,
            Self::Inserted | Self::Removed | Self::Updated | Self::Conflict | Self::Expired | Self::Evicted => Level::INFO,
            Self::Error => Level::ERROR,
        }
    }
}
