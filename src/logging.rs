//! Tracing subscriber setup for binaries and tests embedding the planner.

use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init();
}

/// Like [`init_logging`], but writes through the test harness's capture.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init();
}
