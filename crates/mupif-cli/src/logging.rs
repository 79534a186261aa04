//! Logging initialisation for binaries.
//!
//! Library crates only emit `tracing` events; a binary calls
//! [`init_logging`] once to decide where they go.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber.
///
/// Events go to stderr, keeping stdout for command output, or are appended
/// to `log_file` when one is given.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let fmt_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .context("Logging already initialised")?;
        }
        None => {
            let fmt_layer = fmt::layer().with_writer(std::io::stderr).compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()
                .context("Logging already initialised")?;
        }
    }

    Ok(())
}
