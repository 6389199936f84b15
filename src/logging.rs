// src/logging.rs

//! Logging setup for `assetdag` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `ASSETDAG_LOG` environment variable (a level such as "debug", or a
//!    full filter directive such as "assetdag::watch=trace,info")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout carries only the build summary
//! and the dry-run plan.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "ASSETDAG_LOG";

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_from_log_level(lvl).as_str()),
        None => std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|s| parse_filter(&s))
            .unwrap_or_else(|| EnvFilter::new("info")),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
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

fn parse_filter(s: &str) -> Option<EnvFilter> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let s = if s.eq_ignore_ascii_case("warning") { "warn" } else { s };
    EnvFilter::try_new(s.to_lowercase()).ok()
}
