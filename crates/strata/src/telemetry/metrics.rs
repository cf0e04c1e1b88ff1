// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! OpenTelemetry instruments for cache handles.

use opentelemetry::{
    InstrumentationScope,
    metrics::{Counter, Gauge, Histogram, Meter, MeterProvider},
};

const SCOPE_NAME: &str = "strata";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(SCOPE_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

/// Instruments shared by every handle of one manager.
#[derive(Debug)]
pub(crate) struct HandleInstruments {
    pub operations: Counter<u64>,
    pub duration: Histogram<f64>,
    pub items: Gauge<u64>,
}

impl HandleInstruments {
    pub fn new(meter: &Meter) -> Self {
        Self {
            operations: meter
                .u64_counter("strata.handle.operations")
                .with_description("Operations performed by cache handles, by outcome")
                .with_unit("{operation}")
                .build(),
            duration: meter
                .f64_histogram("strata.handle.operation.duration")
                .with_description("Time a cache handle spent in its backend")
                .with_unit("s")
                .build(),
            items: meter
                .u64_gauge("strata.handle.items")
                .with_description("Items held by a cache handle's backend")
                .with_unit("{item}")
                .build(),
        }
    }
}
