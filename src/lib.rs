//! Sock puppet audit launcher.
//!
//! Two halves share this crate: the launch controller (`launch`) partitions a
//! scored video corpus into cohorts and admits one containerised puppet per
//! cohort under a concurrency ceiling, and the puppet runner (`agent`)
//! executes a single task manifest against a browser automation driver.
//! The two only meet through the manifest files in `task`.

pub mod agent;
pub mod config;
pub mod error;
pub mod launch;
pub mod task;

use tracing_subscriber::EnvFilter;

pub use error::{LaunchError, RunError};

/// Initialize tracing for either binary.
///
/// `RUST_LOG` controls the filter (default `info`). `LOG_FORMAT=json` switches
/// to structured output.
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_default();

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
}
