//! Subscriber installation and tracer shutdown.

use std::{io, sync::OnceLock};

use opentelemetry::{
    global::{self, set_text_map_propagator},
    trace::{TraceError, TracerProvider},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
};
use thiserror::Error;
use tracing::{debug, error, info, Level};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    filter::{EnvFilter, ParseError},
    fmt::{layer, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    Layer,
};

use super::types::LoggerConfig;

/// Kept so [`finalize`] can flush pending spans.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Quiet defaults for chatty transport crates, still overridable through `RUST_LOG`.
const DEFAULT_DIRECTIVES: &[&str] = &["hyper=warn", "h2=warn", "tower=warn"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive: {0}")]
    Directive(#[from] ParseError),

    #[error("failed to install otlp pipeline: {0}")]
    Otlp(#[from] TraceError),

    #[error("global subscriber already set: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

fn build_filter() -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

/// Installs the global subscriber described by `config`.
///
/// Must run inside a tokio runtime when OTLP export is configured, since the batch span
/// processor is driven by the runtime.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    set_text_map_propagator(TraceContextPropagator::new());

    let stdout_layer = {
        let writer = if config.stdout.use_stderr {
            BoxMakeWriter::new(io::stderr)
        } else {
            BoxMakeWriter::new(io::stdout)
        };
        let base = layer()
            .with_writer(writer)
            .with_span_events(config.stdout.fmt_span.clone());
        if config.stdout.json_format {
            base.json().with_filter(build_filter()?).boxed()
        } else {
            base.compact().with_filter(build_filter()?).boxed()
        }
    };

    let file_layer = match &config.file {
        Some(file) => {
            let appender =
                RollingFileAppender::new(file.rotation.clone(), &file.directory, &file.file_name_prefix);
            let base = layer().with_writer(appender).with_ansi(false);
            Some(if file.json_format {
                base.json().with_filter(build_filter()?).boxed()
            } else {
                base.compact().with_filter(build_filter()?).boxed()
            })
        }
        None => None,
    };

    let otel_layer = match &config.otlp {
        Some(otlp) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(otlp.url.clone())
                .with_timeout(otlp.timeout);

            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(Config::default().with_resource(config.resource.build_resource()))
                .install_batch(Tokio)?;

            if TRACER_PROVIDER.set(provider.clone()).is_err() {
                error!("tracer provider was already installed");
            }

            let tracer = provider.tracer("consensus-tracer");
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    info!(
        service_name = %config.resource.service_name,
        service_version = ?config.resource.service_version,
        otlp = config.otlp.is_some(),
        file = config.file.is_some(),
        "logging initialized"
    );
    Ok(())
}

/// Flushes and shuts down the OTLP tracer provider, if one was installed.
pub fn finalize() {
    match TRACER_PROVIDER.get() {
        Some(provider) => {
            if let Err(err) = provider.shutdown() {
                error!(?err, "failed to shut down tracer provider");
            } else {
                info!("tracer provider shut down");
            }
        }
        None => debug!("no tracer provider to shut down"),
    }

    global::shutdown_tracer_provider();
}
