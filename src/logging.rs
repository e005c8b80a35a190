// src/logging.rs

//! Logging setup for `dagrun` using `tracing` + `tracing-subscriber`.
//!
//! Filter priority:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `DAGRUN_LOG`, which takes full `EnvFilter` directives
//!    (e.g. "info" or "dagrun::sock=debug,warn")
//! 3. `info`
//!
//! Execution processes spawned by the controller inherit `DAGRUN_LOG`, so one
//! variable tunes both sides. Logs go to STDERR; stdout carries only command
//! output (status JSON, request ids).

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "DAGRUN_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level, std::env::var(LOG_ENV).ok()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("installing log subscriber")
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<String>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive(level));
    }
    env.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error".to_string()));
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn environment_directives_are_used_verbatim() {
        let filter = build_filter(None, Some("dagrun::sock=trace,warn".to_string()));
        let rendered = filter.to_string();
        assert!(rendered.contains("dagrun::sock=trace"), "{rendered}");
        assert!(rendered.contains("warn"), "{rendered}");
    }

    #[test]
    fn blank_or_invalid_environment_falls_back_to_info() {
        assert_eq!(build_filter(None, Some("  ".to_string())).to_string(), "info");
        assert_eq!(build_filter(None, Some("dagrun=loudest".to_string())).to_string(), "info");
        assert_eq!(build_filter(None, None).to_string(), "info");
    }
}
