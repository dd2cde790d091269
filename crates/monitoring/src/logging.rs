//! Logging configuration and initialization
//!
//! Console logging to stdout, or daily rotating files through a non-blocking
//! writer. Settings come from the environment:
//! - `LOG_DESTINATION`: `console` (default) or `file`
//! - `LOG_DIR`: directory for log files (default `./logs`)
//! - `LOG_FILE_PREFIX`: file name prefix (default `estate`)
//! - `RUST_LOG`: filter directives

use anyhow::{anyhow, Result};
use std::env;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogDestination {
    Console,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub destination: LogDestination,
    pub dir: String,
    pub file_prefix: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            destination: LogDestination::Console,
            dir: "./logs".to_string(),
            file_prefix: "estate".to_string(),
        }
    }
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let destination = match lookup("LOG_DESTINATION")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Some("file") => LogDestination::File,
            _ => LogDestination::Console,
        };

        Self {
            destination,
            dir: lookup("LOG_DIR").unwrap_or(defaults.dir),
            file_prefix: lookup("LOG_FILE_PREFIX").unwrap_or(defaults.file_prefix),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `default_filter` applies when `RUST_LOG` is unset or invalid. For file
/// logging the returned guard must be held for the life of the process, or
/// buffered lines are lost.
pub fn init_logging(default_filter: &str) -> Result<Option<WorkerGuard>> {
    let settings = LogSettings::from_env();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    match settings.destination {
        LogDestination::Console => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stdout)
                        .with_ansi(true)
                        .with_target(false),
                )
                .try_init()
                .map_err(|e| anyhow!("Failed to initialize console tracing subscriber: {}", e))?;

            info!("Logging to console (stdout)");
            Ok(None)
        }
        LogDestination::File => {
            std::fs::create_dir_all(&settings.dir).map_err(|e| {
                anyhow!("Failed to create log directory '{}': {}", settings.dir, e)
            })?;

            let file_appender = rolling::daily(&settings.dir, &settings.file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(false),
                )
                .try_init()
                .map_err(|e| anyhow!("Failed to initialize file tracing subscriber: {}", e))?;

            info!(
                "Logging to daily rotating files {}/{}.<YYYY-MM-DD>",
                settings.dir, settings.file_prefix
            );
            Ok(Some(guard))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = LogSettings::from_lookup(|_| None);
        assert_eq!(settings, LogSettings::default());
        assert_eq!(settings.destination, LogDestination::Console);
    }

    #[test]
    fn test_file_destination_is_case_insensitive() {
        let settings = LogSettings::from_lookup(lookup_from(&[
            ("LOG_DESTINATION", "FILE"),
            ("LOG_DIR", "/var/log/estate"),
            ("LOG_FILE_PREFIX", "purchase"),
        ]));
        assert_eq!(settings.destination, LogDestination::File);
        assert_eq!(settings.dir, "/var/log/estate");
        assert_eq!(settings.file_prefix, "purchase");
    }

    #[test]
    fn test_unknown_destination_falls_back_to_console() {
        let settings = LogSettings::from_lookup(lookup_from(&[("LOG_DESTINATION", "syslog")]));
        assert_eq!(settings.destination, LogDestination::Console);
    }
}
