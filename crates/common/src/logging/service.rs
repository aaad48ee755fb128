//! Logging setup shared by binaries.

use std::path::PathBuf;

use tracing::info;

use super::{format_service_name, init, FileLoggingConfig, LoggerConfig, LoggingError, OtlpConfig};

/// Parameters a binary collects from its args and environment before installing logging.
#[derive(Debug, Default)]
pub struct LoggingInitConfig<'a> {
    pub service_base_name: &'a str,
    /// Deployment label appended to the service name, like `prod` or `dev`.
    pub service_label: Option<&'a str>,
    pub otlp_url: Option<&'a str>,
    pub log_dir: Option<PathBuf>,
    pub log_file_prefix: Option<&'a str>,
    pub json_format: bool,
    /// Send console output to stderr instead of stdout.
    pub log_to_stderr: bool,
}

/// Builds a [`LoggerConfig`] from the binary-level parameters.
pub fn logger_config_from(config: &LoggingInitConfig<'_>) -> LoggerConfig {
    let service_name = format_service_name(config.service_base_name, config.service_label);
    let mut lconfig = LoggerConfig::new(service_name)
        .with_json_logging(config.json_format)
        .with_stderr_output(config.log_to_stderr);

    if let Some(url) = config.otlp_url {
        lconfig = lconfig.with_otlp(OtlpConfig::new(url));
    }

    if let Some(dir) = &config.log_dir {
        let prefix = config.log_file_prefix.unwrap_or(config.service_base_name);
        lconfig = lconfig.with_file_logging(FileLoggingConfig::new(dir.clone(), prefix));
    }

    lconfig
}

/// Installs logging and reports which outputs are active.
pub fn init_logging_from_config(config: LoggingInitConfig<'_>) -> Result<(), LoggingError> {
    let lconfig = logger_config_from(&config);
    let file = lconfig.file.clone();
    init(lconfig)?;

    if let Some(url) = config.otlp_url {
        info!(%url, "using OpenTelemetry tracing output");
    }
    if let Some(file) = file {
        info!(
            log_dir = %file.directory.display(),
            log_prefix = %file.file_name_prefix,
            "file logging enabled"
        );
    }
    Ok(())
}
