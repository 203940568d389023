//! Logging Infrastructure
//!
//! Structured logging setup with support for both development and production environments.

use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::core::SyncConfig;

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger from the engine configuration
///
/// Production environments log JSON.
pub fn init_logger_from_config(config: &SyncConfig) {
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.is_production()),
        config.log_dir.as_deref(),
    );
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG` takes precedence over `log_level`. Safe to call more than once;
/// only the first call installs a subscriber.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let json = json.unwrap_or(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // Add file output if log_dir is provided
    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if log_path.exists()
            && let Some(dir_str) = log_path.to_str()
        {
            let file_appender = tracing_appender::rolling::daily(dir_str, "edge-sync");
            let subscriber = subscriber.with_ansi(false).with_writer(file_appender);
            let _ = if json {
                subscriber.json().try_init()
            } else {
                subscriber.try_init()
            };
            return;
        }
        eprintln!("Log directory {dir} does not exist, logging to stdout");
    }

    let _ = if json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        init_logger_with_file(Some("debug"), Some(false), dir.path().to_str());
        // Second call must not panic
        init_logger();
        tracing::info!(component = "logger-test", "logger initialised");
    }
}
