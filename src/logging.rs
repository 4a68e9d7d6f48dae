use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{EventcError, Result};

const LOG_FILE_PREFIX: &str = "git-eventc";

pub fn parse_rotation(rotation: &str) -> Result<Rotation> {
    match rotation.to_ascii_lowercase().as_str() {
        "minutely" => Ok(Rotation::MINUTELY),
        "hourly" => Ok(Rotation::HOURLY),
        "daily" => Ok(Rotation::DAILY),
        "never" => Ok(Rotation::NEVER),
        other => Err(EventcError::ConfigError(format!(
            "unknown log rotation '{}'",
            other
        ))),
    }
}

fn file_appender(config: &LoggingConfig) -> Result<Option<RollingFileAppender>> {
    let Some(directory) = &config.directory else {
        return Ok(None);
    };

    std::fs::create_dir_all(directory)?;

    let appender = RollingFileAppender::builder()
        .rotation(parse_rotation(&config.rotation)?)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(directory)
        .map_err(|e| EventcError::ConfigError(format!("Failed to create log file: {}", e)))?;

    Ok(Some(appender))
}

/// Installs the global subscriber: console output on stderr, plus rolling
/// log files when a directory is configured. The returned guard must be kept
/// alive for the file writer to flush.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| EventcError::ConfigError(format!("Invalid log level: {}", e)))?;

    let (file_layer, guard) = match file_appender(config)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false); // Disable ANSI colors for file logs
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| EventcError::ConfigError(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
