//! Tracing-subscriber initialization. Pulled out of `main.rs` into its own module since both the
//! `run` and the one-shot CLI subcommands need it, and both `cli.rs` unit
//! tests and `main.rs` should be able to call it without duplicating the
//! `EnvFilter` construction.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::ConfigError;

/// Installs a global `tracing` subscriber. `level` is a standard
/// `tracing_subscriber::EnvFilter` directive (e.g. `"info"`, `"debug"`);
/// the `LOG_LEVEL` env var, if set, wins over it (see `Config::with_env_overrides`).
pub fn init(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// As `init`, but appends to `log_file` (`--log-file`) instead of stderr
/// when one is given.
pub fn init_with_file(level: &str, log_file: Option<&Path>) -> Result<(), ConfigError> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    match log_file {
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .init();
        }
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
    }
    Ok(())
}
