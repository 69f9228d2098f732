//! Structured logging for the FESL server.
//!
//! Console output with uptime timestamps and module paths, plus an optional
//! JSON log file for later analysis. The level comes from `RUST_LOG` when
//! set, otherwise from the configuration.

use std::path::Path;

use fesl_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// File name of the JSON log inside the log directory.
pub const LOG_FILE_NAME: &str = "fesl.log";

const DEFAULT_FILTER: &str = "info";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - Directory for the JSON log file, used when
///   `config.logging.json_file` is set
/// * `config` - Optional configuration supplying the log level
///
/// ```no_run
/// use fesl_config::Config;
/// use fesl_log::init_logging;
///
/// let config = Config::default();
/// init_logging(Some(std::path::Path::new("./logs")), Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, config: Option<&Config>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    let json_file = config.is_some_and(|c| c.logging.json_file);
    if json_file
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// Filter directives used when `RUST_LOG` is unset.
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.logging.log_level.trim().is_empty() => {
            config.logging.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// `EnvFilter` with the default directives.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        assert_eq!(filter_directives(None), "info");
        assert!(format!("{}", default_env_filter()).contains("info"));
    }

    #[test]
    fn test_config_level_used() {
        let mut config = Config::default();
        config.logging.log_level = "debug,fesl_net=trace".to_string();
        assert_eq!(filter_directives(Some(&config)), "debug,fesl_net=trace");

        config.logging.log_level = "  ".to_string();
        assert_eq!(filter_directives(Some(&config)), "info");
    }

    #[test]
    fn test_subsystem_filter() {
        let filter = EnvFilter::new("info,fesl_net=debug");
        assert!(format!("{}", filter).contains("fesl_net=debug"));
    }

    #[test]
    fn test_env_filter_parsing() {
        for filter_str in [
            "info",
            "debug,fesl_handlers=trace",
            "warn,fesl_net::session=debug",
            "error",
        ] {
            assert!(
                EnvFilter::try_from(filter_str).is_ok(),
                "Failed to parse filter: {filter_str}"
            );
        }
    }

    #[test]
    fn test_log_file_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_file_path = temp_dir.path().join(LOG_FILE_NAME);
        std::fs::File::create(&log_file_path).unwrap();
        assert_eq!(log_file_path.file_name().unwrap(), "fesl.log");
        assert!(log_file_path.exists());
    }
}
