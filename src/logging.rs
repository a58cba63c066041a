// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `-v` / `--verbose` (debug)
//! 3. `TEUTHOLOGY_LOG` environment variable (e.g. "info", "debug")
//! 4. default to `info`
//!
//! Logs always go to STDERR. When a run is archived, the same events are also
//! written without colours to `teuthology.log` in the archive directory.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::cli::LogLevel;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup. If a global subscriber is already installed
/// (an embedding program, or a test harness), it is left in place.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    verbose: bool,
    log_file: Option<&Path>,
) -> Result<()> {
    let level = resolve_level(
        cli_level,
        verbose,
        std::env::var("TEUTHOLOGY_LOG").ok().as_deref(),
    );

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        tracing::debug!(error = %err, "tracing subscriber already installed; keeping it");
    }

    Ok(())
}

fn resolve_level(
    cli_level: Option<LogLevel>,
    verbose: bool,
    env_level: Option<&str>,
) -> tracing::Level {
    if let Some(lvl) = cli_level {
        return level_from_log_level(lvl);
    }
    if verbose {
        return tracing::Level::DEBUG;
    }
    env_level
        .and_then(parse_level_str)
        .unwrap_or(tracing::Level::INFO)
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    match lvl {
        LogLevel::Error => tracing::Level::ERROR,
        LogLevel::Warn => tracing::Level::WARN,
        LogLevel::Info => tracing::Level::INFO,
        LogLevel::Debug => tracing::Level::DEBUG,
        LogLevel::Trace => tracing::Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_beats_verbose_and_env() {
        assert_eq!(
            resolve_level(Some(LogLevel::Warn), true, Some("trace")),
            tracing::Level::WARN
        );
        assert_eq!(resolve_level(None, true, Some("error")), tracing::Level::DEBUG);
        assert_eq!(resolve_level(None, false, Some("Warning")), tracing::Level::WARN);
        assert_eq!(resolve_level(None, false, Some("bogus")), tracing::Level::INFO);
    }
}
