//! Logging and tracing setup for the BookVerse operations tools.
//! Provides the subscriber installation, OTLP export toggles and per-run
//! labels shared by logs and metrics.

use anyhow::Result;

mod config;
mod context;
mod metrics;
mod tracing_init;

pub use config::{TelemetryConfig, TelemetryProtocol};
pub use context::RunLabels;
pub use metrics::{record_action, record_run_duration};
pub use tracing_init::{init_telemetry, shutdown};

/// Installs the subscriber configured from `RUST_LOG`, `LOG_FORMAT` and the
/// `OTEL_*` variables.
pub fn install(service_name: &str) -> Result<()> {
    init_telemetry(TelemetryConfig::from_env(
        service_name,
        env!("CARGO_PKG_VERSION"),
    ))
}
