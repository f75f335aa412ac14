//! Subscriber installation for the `meridian` binary
//!
//! Diagnostics never go to stdout: the console sink writes to stderr and the
//! optional file sink writes JSON lines through a non-blocking appender.
//! `MERIDIAN_LOG` overrides the level directive with a full `EnvFilter` spec.

use crate::config::{ConsoleFormat, LoggingConfig};
use crate::domain::{MeridianError, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable holding an `EnvFilter` directive
pub const FILTER_ENV: &str = "MERIDIAN_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writer thread alive; drop it last so buffered lines flush
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber
///
/// `level` is one of trace, debug, info, warn or error (any case). Fails when
/// the level is unknown, the log directory cannot be created, or a subscriber
/// is already installed.
///
/// # Example
///
/// ```no_run
/// use meridian::config::LoggingConfig;
/// use meridian::logging::init_logging;
///
/// let _guard = init_logging("info", &LoggingConfig::default()).expect("logging");
/// ```
pub fn init_logging(level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let directive = filter_directive(level)?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if let Some(layer) = console_layer(config.console, &directive) {
        layers.push(layer);
    }

    let file_guard = match file_writer(config)? {
        Some((writer, guard)) => {
            layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(writer)
                    .with_filter(env_filter(&directive))
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| MeridianError::Configuration(format!("Failed to install logger: {e}")))?;

    tracing::debug!(
        console = ?config.console,
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Default directive scoping `level` to this crate's targets
fn filter_directive(level: &str) -> Result<String> {
    let level: Level = level.trim().parse().map_err(|_| {
        MeridianError::Configuration(format!(
            "Invalid log level: {level}. Must be one of: trace, debug, info, warn, error"
        ))
    })?;
    Ok(format!("meridian={}", level.as_str().to_lowercase()))
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(directive))
}

fn console_layer(format: ConsoleFormat, directive: &str) -> Option<BoxedLayer> {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    match format {
        ConsoleFormat::Off => None,
        ConsoleFormat::Text => Some(layer.compact().with_filter(env_filter(directive)).boxed()),
        ConsoleFormat::Json => Some(layer.json().with_filter(env_filter(directive)).boxed()),
    }
}

/// Open the rolling log file when local logging is enabled
fn file_writer(config: &LoggingConfig) -> Result<Option<(NonBlocking, WorkerGuard)>> {
    if !config.local_enabled {
        return Ok(None);
    }

    let dir = Path::new(&config.local_path);
    std::fs::create_dir_all(dir).map_err(|e| {
        MeridianError::Configuration(format!(
            "Failed to create log directory {}: {e}",
            dir.display()
        ))
    })?;

    let appender = RollingFileAppender::new(
        rotation(&config.local_rotation),
        dir,
        &config.local_file_name,
    );
    Ok(Some(tracing_appender::non_blocking(appender)))
}

// Anything else was rejected by LoggingConfig::validate.
fn rotation(name: &str) -> Rotation {
    match name {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("trace", "meridian=trace")]
    #[test_case("DEBUG", "meridian=debug")]
    #[test_case(" Info ", "meridian=info")]
    #[test_case("warn", "meridian=warn")]
    #[test_case("error", "meridian=error")]
    fn test_filter_directive(level: &str, expected: &str) {
        assert_eq!(filter_directive(level).unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("verbose" ; "unknown name")]
    fn test_filter_directive_rejects(level: &str) {
        let err = filter_directive(level).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test_case("hourly", Rotation::HOURLY)]
    #[test_case("daily", Rotation::DAILY)]
    #[test_case("never", Rotation::NEVER)]
    fn test_rotation(name: &str, expected: Rotation) {
        assert_eq!(rotation(name), expected);
    }

    #[test]
    fn test_console_off_installs_nothing() {
        assert!(console_layer(ConsoleFormat::Off, "meridian=info").is_none());
        assert!(console_layer(ConsoleFormat::Text, "meridian=info").is_some());
        assert!(console_layer(ConsoleFormat::Json, "meridian=info").is_some());
    }

    #[test]
    fn test_file_writer_disabled() {
        let config = LoggingConfig::default();
        assert!(file_writer(&config).unwrap().is_none());
    }

    #[test]
    fn test_file_writer_creates_the_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("logs");
        let config = LoggingConfig {
            local_enabled: true,
            local_path: dir.to_string_lossy().to_string(),
            local_rotation: "never".to_string(),
            ..LoggingConfig::default()
        };

        let (_writer, guard) = file_writer(&config).unwrap().unwrap();
        drop(guard);
        assert!(dir.is_dir());
    }

    #[test]
    fn test_file_writer_reports_an_unusable_directory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("taken");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = LoggingConfig {
            local_enabled: true,
            local_path: blocker.join("logs").to_string_lossy().to_string(),
            ..LoggingConfig::default()
        };

        let err = file_writer(&config).unwrap_err();
        assert!(err.to_string().contains("Failed to create log directory"));
    }
}
