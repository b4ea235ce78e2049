//! Serve the RSVP and payment intake endpoint.
use std::time::Duration;

use envconfig::Envconfig;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchConfig, RandomIdGenerator, Sampler, Tracer};
use opentelemetry_sdk::{runtime, Resource};
use tokio::signal::unix::{signal, SignalKind};
use tracing::level_filters::LevelFilter;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use intake::config::Config;
use intake::server::serve;

const OTLP_EXPORT_TIMEOUT: Duration = Duration::from_secs(3);

/// Resolves on the first SIGTERM or SIGINT.
async fn shutdown_signal() {
    let mut term = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut interrupt = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    let received = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };

    tracing::info!(signal = received, "draining in-flight submissions before exit");
}

fn otlp_tracer(config: &Config, endpoint: &str) -> Tracer {
    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
        config.otel_sampling_rate,
    )));
    let resource = Resource::new([KeyValue::new(
        "service.name",
        config.otel_service_name.clone(),
    )]);

    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(sampler)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .with_batch_config(BatchConfig::default())
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_timeout(OTLP_EXPORT_TIMEOUT),
        )
        .install_batch(runtime::Tokio)
        .expect("failed to install the OTLP pipeline")
}

/// Stdout logs follow RUST_LOG (INFO by default). Spans are exported over OTLP
/// only when OTEL_URL is set, from LOG_LEVEL up.
fn init_tracing(config: &Config) {
    let stdout = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    let export = config
        .otel_url
        .as_deref()
        .map(|endpoint| OpenTelemetryLayer::new(otlp_tracer(config, endpoint)))
        .with_filter(LevelFilter::from_level(config.log_level));

    tracing_subscriber::registry()
        .with(stdout)
        .with(export)
        .init();
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("Invalid configuration:");
    init_tracing(&config);

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind port");
    serve(config, listener, shutdown_signal()).await
}
