//! Logging and observability
//!
//! The binary installs a stderr console sink (text or JSON) and, when enabled,
//! a rotating JSON log file. Library code only emits events.
//!
//! # Example
//!
//! ```no_run
//! use meridian::logging::init_logging;
//! use meridian::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a conversion
///
/// # Example
///
/// ```no_run
/// use meridian::log_conversion_start;
///
/// log_conversion_start!("build", "IDCR - Vital Signs.v1");
/// ```
#[macro_export]
macro_rules! log_conversion_start {
    ($kind:expr, $template_id:expr) => {
        tracing::info!(
            kind = $kind,
            template_id = %$template_id,
            "Starting conversion"
        );
    };
}

/// Log the completion of a conversion
///
/// # Example
///
/// ```no_run
/// use meridian::log_conversion_complete;
/// use std::time::Duration;
///
/// log_conversion_complete!("flatten", 42, Duration::from_millis(3));
/// ```
#[macro_export]
macro_rules! log_conversion_complete {
    ($kind:expr, $entries:expr, $duration:expr) => {
        tracing::info!(
            kind = $kind,
            entries = $entries,
            duration_ms = $duration.as_millis() as u64,
            "Conversion completed"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use meridian::log_error_with_context;
/// use meridian::domain::MeridianError;
///
/// let error = MeridianError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
