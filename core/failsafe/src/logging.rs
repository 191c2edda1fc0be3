//! Tracing setup for the watchdog binary.
//!
//! Events go to stdout and to a per-day file under `<root>/logs/`. `RUST_LOG`
//! overrides the configured level when set.

use fs_err as fs;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "failsafe";
const DEFAULT_LEVEL: &str = "INFO";

/// Maps `general.log_level` to a filter. Unknown names fall back to INFO.
pub fn parse_level(value: &str) -> LevelFilter {
    match value.trim().to_ascii_uppercase().as_str() {
        "WARNING" => LevelFilter::WARN,
        "CRITICAL" | "FATAL" => LevelFilter::ERROR,
        other => LevelFilter::from_str(other).unwrap_or(LevelFilter::INFO),
    }
}

/// Reads `general.log_level` straight from the configuration file so logging
/// can start before the configuration store loads. Anything unreadable means
/// INFO; the store reports the problem once logging is up.
pub fn configured_level(config_file: &Path) -> String {
    fs::read_to_string(config_file)
        .ok()
        .and_then(|contents| serde_json::from_str::<Value>(&contents).ok())
        .and_then(|document| {
            document
                .pointer("/general/log_level")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// Installs the global subscriber. The returned guard must outlive all logging.
pub fn init(logs_dir: &Path, level: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(parse_level(level).into()));

    let (file_layer, guard, dir_error) = match fs::create_dir_all(logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    if let Some(err) = dir_error {
        tracing::warn!(error = %err, "Log directory unavailable; logging to stdout only");
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("debug"), LevelFilter::DEBUG);
        assert_eq!(parse_level("INFO"), LevelFilter::INFO);
        assert_eq!(parse_level(" Warn "), LevelFilter::WARN);
    }

    #[test]
    fn legacy_and_unknown_level_names() {
        assert_eq!(parse_level("WARNING"), LevelFilter::WARN);
        assert_eq!(parse_level("CRITICAL"), LevelFilter::ERROR);
        assert_eq!(parse_level("chatty"), LevelFilter::INFO);
        assert_eq!(parse_level(""), LevelFilter::INFO);
    }

    #[test]
    fn configured_level_reads_general_block() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("failsafe.json");
        std::fs::write(&path, r#"{"general": {"log_level": "DEBUG"}}"#).expect("write");

        assert_eq!(configured_level(&path), "DEBUG");
    }

    #[test]
    fn configured_level_defaults_when_file_is_unusable() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("failsafe.json");
        assert_eq!(configured_level(&path), "INFO");

        std::fs::write(&path, "{ not json").expect("write");
        assert_eq!(configured_level(&path), "INFO");

        std::fs::write(&path, r#"{"general": {"log_level": 5}}"#).expect("write");
        assert_eq!(configured_level(&path), "INFO");
    }
}
