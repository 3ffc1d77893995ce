//! Tracing subscriber setup.
//!
//! Library code never calls `println!`/`eprintln!` — every subsystem logs
//! through `tracing`. This module is the one place that turns a
//! [`LoggingConfig`] into an installed global subscriber, wiring an
//! `EnvFilter` built from the configured level and, when a log directory is
//! set, a non-blocking rotated file writer alongside the stderr layer.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Guard returned by [`init`]. Dropping it flushes and stops the background
/// writer thread, so the caller (`main`) must keep it alive for the process
/// lifetime.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global tracing subscriber from `config`.
///
/// Always logs to stderr. When `config.directory` is set, also writes
/// daily-rotated, non-blocking JSON-or-pretty lines (matching
/// `config.json_output`) to `<directory>/agentcore.log.<date>`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level/filter: {}", config.level))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match &config.directory {
        None => {
            if config.json_output {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stderr_layer.json())
                    .try_init()
                    .context("failed to install tracing subscriber")?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stderr_layer)
                    .try_init()
                    .context("failed to install tracing subscriber")?;
            }
            Ok(LoggingGuard { _file_guard: None })
        }
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {dir:?}"))?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, "agentcore.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

            if config.json_output {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stderr_layer.json())
                    .with(file_layer.json())
                    .try_init()
                    .context("failed to install tracing subscriber")?;
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(stderr_layer)
                    .with(file_layer)
                    .try_init()
                    .context("failed to install tracing subscriber")?;
            }
            Ok(LoggingGuard {
                _file_guard: Some(guard),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_only_config_builds_a_filter_without_error() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json_output: false,
            directory: None,
        };
        assert!(EnvFilter::try_new(&config.level).is_ok());
    }

    #[test]
    fn invalid_level_is_rejected_before_subscriber_install() {
        let config = LoggingConfig {
            level: "not-a-real-level!!".to_string(),
            json_output: false,
            directory: None,
        };
        assert!(EnvFilter::try_new(&config.level).is_err() || init(&config).is_err());
    }
}
