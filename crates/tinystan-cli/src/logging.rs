//! Diagnostic logging setup
//!
//! Library events go to stderr so that stdout stays clean for results.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Level used when nothing else asks for one
const DEFAULT_LEVEL: &str = "warn";

/// Pick the filter directive
///
/// `-v` flags win, then `RUST_LOG`, then the configured level (which
/// already reflects `TINYSTAN_LOG`).
fn filter_directive(verbosity: u8, rust_log: Option<String>, configured: Option<&str>) -> String {
    match verbosity {
        0 => rust_log
            .filter(|s| !s.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LEVEL.to_string()),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global `tracing` subscriber
pub fn init(verbosity: u8, configured: Option<&str>) -> Result<()> {
    let directive = filter_directive(verbosity, std::env::var("RUST_LOG").ok(), configured);
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", directive, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity >= 2)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
