//! Shared plumbing for the kubegate crates
//!
//! Telemetry bootstrap (logging, tracing, metric providers) and the metric
//! instruments recorded by the gateway.

#![deny(missing_docs)]

pub mod metrics;
pub mod telemetry;

pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError, TelemetryHandle};
