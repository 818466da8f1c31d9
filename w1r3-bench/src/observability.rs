//! Logging and metric export setup.

use anyhow::{Context, Result};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Histogram;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing_subscriber::{EnvFilter, prelude::*};
use uuid::Uuid;
use w1r3_instrument::boundaries::{self, HistogramKind};

use crate::config::Config;

/// Installs the tracing subscriber writing to stderr.
pub fn initialize_tracing(config: &Config) {
    // RUST_LOG overrides the configured level when set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_string()));

    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    tracing_subscriber::registry()
        .with(format)
        .with(env_filter)
        .init();
}

/// Installs the OTLP metric exporter, if one is configured.
///
/// Returns the provider so the caller can flush and shut it down on exit;
/// histograms recorded after shutdown are silently dropped.
pub fn initialize_metrics(config: &Config, instance: Uuid) -> Result<Option<SdkMeterProvider>> {
    let Some(endpoint) = &config.metrics.otlp_endpoint else {
        tracing::warn!("no OTLP endpoint configured, metrics will not be exported");
        return Ok(None);
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to create OTLP metric exporter")?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.metrics.export_interval)
        .build();

    let resource = Resource::builder()
        .with_service_name("w1r3")
        .with_attribute(KeyValue::new(
            "service.instance.id",
            instance.to_string(),
        ))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();
    global::set_meter_provider(provider.clone());

    Ok(Some(provider))
}

/// The three histogram streams the benchmark records into.
#[derive(Clone, Debug)]
pub struct Histograms {
    /// Operation latency in seconds.
    pub latency: Histogram<f64>,
    /// CPU nanoseconds per transferred byte.
    pub cpu_per_byte: Histogram<f64>,
    /// Allocated bytes per transferred byte.
    pub allocated_per_byte: Histogram<f64>,
}

/// Creates the benchmark histograms on the global meter provider.
///
/// Bucket boundaries are fixed at creation so every process in a fleet
/// produces mergeable histograms.
pub fn make_histograms(prefix: &str) -> Histograms {
    let meter = global::meter("w1r3");

    let latency = meter
        .f64_histogram(format!("{prefix}/latency"))
        .with_description("Operation latency.")
        .with_unit("s")
        .with_boundaries(boundaries::build(HistogramKind::Latency))
        .build();

    let cpu_per_byte = meter
        .f64_histogram(format!("{prefix}/cpu"))
        .with_description("CPU usage per byte.")
        .with_unit("ns/By{CPU}")
        .with_boundaries(boundaries::build(HistogramKind::CpuPerByte))
        .build();

    let allocated_per_byte = meter
        .f64_histogram(format!("{prefix}/memory"))
        .with_description("Memory usage per byte.")
        .with_unit("1{memory}")
        .with_boundaries(boundaries::build(HistogramKind::AllocatedPerByte))
        .build();

    Histograms {
        latency,
        cpu_per_byte,
        allocated_per_byte,
    }
}
