//! Logging subsystem: stdout, rolling file and optional OTLP export.

mod manager;
mod service;
mod types;


pub use manager::{finalize, init, LoggingError};
pub use service::{init_logging_from_config, logger_config_from, LoggingInitConfig};
pub use tracing_appender::rolling::Rotation;
pub use types::{FileLoggingConfig, LoggerConfig, OtlpConfig, ResourceConfig, StdoutConfig};

/// Formats a service name with an optional label suffix.
pub fn format_service_name(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
