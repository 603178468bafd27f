//! Logging and OpenTelemetry setup for the RDR binaries
//!
//! `init_logging` builds a `tracing` registry from [`LoggingConfig`]: an env filter,
//! console output (human or JSON), an optional rolling log file and an optional OTLP
//! span exporter. `init_simple_logging` is the console-only variant used by the CLI.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    trace::{Sampler, TracerProvider},
    Resource,
};
use std::fs;
use std::time::Duration;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVES: &str = "sqlx=warn,tower_http=info";

/// Keeps the file writer alive and flushes span export on drop
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<TelemetryGuard> {
    let mut otel_error = None;
    let tracer_provider = if config.opentelemetry_enabled {
        match init_tracer_provider(config) {
            Ok(provider) => Some(provider),
            Err(e) => {
                otel_error = Some(e.to_string());
                None
            }
        }
    } else {
        None
    };

    let env_filter = build_env_filter(&config.level);

    let file_guard = match &tracer_provider {
        Some(provider) => {
            let otel_layer = tracing_opentelemetry::layer()
                .with_tracer(provider.tracer("rdr-server"))
                .with_tracked_inactivity(true);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(otel_layer);
            init_with_subscriber(subscriber, config)?
        }
        None => init_with_subscriber(tracing_subscriber::registry().with(env_filter), config)?,
    };

    if let Some(provider) = tracer_provider {
        global::set_tracer_provider(provider);
    }

    if let Some(err) = otel_error {
        tracing::warn!(
            error = %err,
            "Failed to initialize OpenTelemetry, continuing without span export"
        );
    }

    tracing::info!(
        otel_enabled = config.opentelemetry_enabled,
        service_name = %config.service_name,
        environment = %config.deployment_environment,
        "Logging initialized"
    );

    Ok(TelemetryGuard {
        _file_guard: file_guard,
    })
}

fn init_tracer_provider(config: &LoggingConfig) -> anyhow::Result<TracerProvider> {
    use opentelemetry_sdk::trace::Config;

    let service_version = config
        .service_version
        .clone()
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", service_version),
        KeyValue::new(
            "deployment.environment",
            config.deployment_environment.clone(),
        ),
    ]);

    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(&config.otlp_endpoint)
        .with_timeout(Duration::from_secs(config.otlp_timeout_seconds))
        .build_span_exporter()
        .map_err(|e| anyhow::anyhow!("Failed to create OTLP exporter: {}", e))?;

    let sampler = if config.trace_sample_ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if config.trace_sample_ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            config.trace_sample_ratio,
        )))
    };

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_config(
            Config::default()
                .with_sampler(sampler)
                .with_resource(resource),
        )
        .build())
}

/// `RUST_LOG` wins over the configured level
fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "rdr={level},rdr_server={level},rdr_cli={level},{DEFAULT_DIRECTIVES}"
        ))
    })
}

fn init_with_subscriber<S>(
    subscriber: S,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>>
where
    S: SubscriberExt + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    let file = if config.file_enabled {
        Some(create_file_appender(config)?)
    } else {
        None
    };

    match (config.json, file) {
        (true, Some((writer, guard))) => {
            subscriber
                .with(fmt::layer().json().with_current_span(true).with_span_list(false))
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        (true, None) => {
            subscriber
                .with(fmt::layer().json().with_current_span(true).with_span_list(false))
                .init();
            Ok(None)
        }
        (false, Some((writer, guard))) => {
            subscriber
                .with(fmt::layer().with_target(true))
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        (false, None) => {
            subscriber.with(fmt::layer().with_target(true)).init();
            Ok(None)
        }
    }
}

fn create_file_appender(config: &LoggingConfig) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.file_directory)?;

    let dir = &config.file_directory;
    let prefix = &config.file_prefix;
    let appender = match config.file_rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(dir, prefix),
        "minutely" => tracing_appender::rolling::minutely(dir, prefix),
        "never" => tracing_appender::rolling::never(dir, format!("{prefix}.log")),
        _ => tracing_appender::rolling::daily(dir, prefix),
    };

    Ok(tracing_appender::non_blocking(appender))
}

pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}

/// Console logging driven by `RUST_LOG` only
pub fn init_simple_logging() {
    tracing_subscriber::registry()
        .with(build_env_filter("info"))
        .with(fmt::layer())
        .init();
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        shutdown_telemetry();
    }
}
