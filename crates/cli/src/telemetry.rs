//! Tracing subscriber and OpenTelemetry wiring.
//!
//! All `tracing` spans and events emitted by the workspace crates flow
//! through the subscriber installed here. The filter comes from `RUST_LOG`
//! (default `info`). With an OTLP endpoint configured, spans are also
//! exported to that collector over gRPC.

use anyhow::Context;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::TracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, ObservabilityConfig};

const SERVICE_NAME: &str = "fabric-client";

/// Keeps the exporter alive; flushes pending spans on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("failed to flush trace exporter: {e}");
            }
        }
    }
}

/// Installs the global subscriber. Must be called inside a tokio runtime
/// when an OTLP endpoint is set.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };

    let provider = config
        .otlp_endpoint
        .as_deref()
        .map(otlp_provider)
        .transpose()?;
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
    });

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(otel_layer)
        .with(filter)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::info!(%endpoint, "exporting traces over OTLP");
    }
    Ok(TelemetryGuard { provider })
}

fn otlp_provider(endpoint: &str) -> anyhow::Result<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .with_context(|| format!("could not build OTLP exporter for {endpoint}"))?;
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}
