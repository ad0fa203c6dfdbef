//! Tracing subscriber setup.
//!
//! Logs always go to a file: stdout is the operator's terminal and carries
//! the child's raw output.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber, logging to `log_file_path`.
pub fn init(log_file_path: &Path) -> Result<()> {
    let log_file = File::create(log_file_path)
        .with_context(|| format!("Failed to create log file: {}", log_file_path.display()))?;
    tracing::subscriber::set_global_default(build_subscriber(log_file))
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// File logging filtered by `RUST_LOG`, DEBUG by default.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::DEBUG.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
