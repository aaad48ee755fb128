//! Configuration types for the logging subsystem.

use std::{path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::format::FmtSpan;

/// Stdout layer options.
#[derive(Debug, Clone)]
pub struct StdoutConfig {
    /// Emit JSON lines instead of the compact human format.
    pub json_format: bool,
    /// Span lifecycle events to print.
    pub fmt_span: FmtSpan,
    /// Write to stderr, for tools whose stdout carries their output.
    pub use_stderr: bool,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            // CLOSE carries span durations, which is what we read when diagnosing slow calls.
            fmt_span: FmtSpan::CLOSE,
            use_stderr: false,
        }
    }
}

/// Rolling file layer options.
#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,
    /// File name prefix, rotated files get a date suffix.
    pub file_name_prefix: String,
    pub rotation: Rotation,
    pub json_format: bool,
}

impl FileLoggingConfig {
    pub fn new(directory: PathBuf, file_name_prefix: impl Into<String>) -> Self {
        Self {
            directory,
            file_name_prefix: file_name_prefix.into(),
            rotation: Rotation::DAILY,
            json_format: false,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_json_format(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }
}

/// OTLP exporter options.
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    /// Collector endpoint, e.g. `http://localhost:4317`.
    pub url: String,
    /// Per-export request timeout.
    pub timeout: Duration,
}

impl OtlpConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

/// Resource attributes attached to exported spans.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    pub service_instance_id: Option<String>,
    pub extra_attributes: Vec<KeyValue>,
}

impl ResourceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: None,
            service_instance_id: None,
            extra_attributes: Vec::new(),
        }
    }

    /// Builds the OpenTelemetry [`Resource`] using semantic convention keys.
    pub fn build_resource(&self) -> Resource {
        let mut attributes = vec![KeyValue::new("service.name", self.service_name.clone())];

        if let Some(version) = &self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }

        if let Some(instance_id) = &self.service_instance_id {
            attributes.push(KeyValue::new("service.instance.id", instance_id.clone()));
        }

        attributes.extend(self.extra_attributes.iter().cloned());
        Resource::new(attributes)
    }
}

/// Top level logger configuration passed to [`super::init`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub resource: ResourceConfig,
    pub stdout: StdoutConfig,
    pub file: Option<FileLoggingConfig>,
    pub otlp: Option<OtlpConfig>,
}

impl LoggerConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            resource: ResourceConfig::new(service_name),
            stdout: StdoutConfig::default(),
            file: None,
            otlp: None,
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.resource.service_version = Some(version.into());
        self
    }

    pub fn with_service_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.resource.service_instance_id = Some(instance_id.into());
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.stdout.json_format = enabled;
        self
    }

    pub fn with_stderr_output(mut self, enabled: bool) -> Self {
        self.stdout.use_stderr = enabled;
        self
    }

    pub fn with_fmt_span(mut self, fmt_span: FmtSpan) -> Self {
        self.stdout.fmt_span = fmt_span;
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    pub fn with_otlp(mut self, config: OtlpConfig) -> Self {
        self.otlp = Some(config);
        self
    }

    pub fn add_resource_attribute(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.resource
            .extra_attributes
            .push(KeyValue::new(key, value.into()));
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new("(consensus-service)")
    }
}
