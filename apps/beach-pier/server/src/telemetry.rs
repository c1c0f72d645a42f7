use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_stdout::SpanExporter;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "beach-pier";

#[derive(Debug, Clone, Default)]
pub struct TelemetryOptions {
    /// Serve Prometheus metrics over HTTP on this address.
    pub metrics_addr: Option<SocketAddr>,
    /// Mirror tracing spans to stdout through OpenTelemetry.
    pub otel_stdout: bool,
}

/// Keeps the tracer provider alive for the life of the process and flushes
/// it on drop.
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Installs the tracing subscriber and metrics recorder. Must be called
    /// from inside the Tokio runtime when `metrics_addr` is set.
    pub fn init(options: &TelemetryOptions) -> Result<Self> {
        let tracer_provider = options.otel_stdout.then(stdout_tracer_provider);
        let otel_layer = tracer_provider.as_ref().map(|provider| {
            global::set_tracer_provider(provider.clone());
            tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
        });

        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(otel_layer)
            .try_init()
            .context("failed to initialise tracing subscriber")?;

        let builder = PrometheusBuilder::new();
        match options.metrics_addr {
            Some(addr) => {
                builder
                    .with_http_listener(addr)
                    .install()
                    .with_context(|| format!("failed to start metrics listener on {addr}"))?;
                info!(metrics_addr = %addr, "prometheus exporter listening");
            }
            None => {
                builder
                    .install_recorder()
                    .context("failed to install Prometheus metrics recorder")?;
            }
        }

        if tracer_provider.is_some() {
            info!("OpenTelemetry stdout exporter enabled");
        }

        Ok(Self { tracer_provider })
    }
}

fn stdout_tracer_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", SERVICE_NAME)])
                .build(),
        )
        .build()
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(provider) = &self.tracer_provider {
            if let Err(err) = provider.shutdown() {
                warn!(error = %err, "failed to shutdown OpenTelemetry tracer provider");
            }
        }
    }
}
