//! Configuration for the benchmark binary.
//!
//! Configuration is loaded from multiple sources with the following
//! precedence (highest to lowest):
//!
//! 1. Environment variables (prefixed with `W1R3__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `W1R3__WORKERS=8` sets the worker count
//! - `W1R3__METRICS__OTLP_ENDPOINT=http://collector:4317` enables metric
//!   export

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "W1R3__";

/// A storage endpoint the benchmark exercises.
///
/// Each iteration picks one transport at random; the name becomes the
/// `ssb.transport` attribute on every histogram sample from that iteration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Transport {
    /// Transport label, e.g. `"JSON"` or `"GRPC+CFE"`.
    pub name: String,
    /// Base URL of the storage frontend for this transport.
    pub endpoint: String,
}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
pub struct Logging {
    /// Minimum log level to output. The `RUST_LOG` environment variable
    /// provides more granular per-module control and takes precedence.
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
        }
    }
}

/// Metric export configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Metrics {
    /// OTLP gRPC endpoint for metric export.
    ///
    /// When `None`, no exporter is installed and histograms go nowhere; the
    /// benchmark still runs, which is useful for smoke tests.
    pub otlp_endpoint: Option<String>,

    /// Prefix for all metric names.
    pub prefix: String,

    /// Interval between metric exports.
    #[serde(with = "humantime_serde")]
    pub export_interval: Duration,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            prefix: "ssb/w1r3".into(),
            export_interval: Duration::from_secs(60),
        }
    }
}

/// Main configuration for the benchmark.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Deployment label attached to every sample, e.g. `"development"`,
    /// `"mig"` or `"gke"`.
    pub deployment: String,

    /// Iterations each worker runs before the process exits.
    pub iterations: u64,

    /// Number of concurrent workers.
    pub workers: usize,

    /// Object sizes the benchmark samples from, uniformly at random.
    pub object_sizes: Vec<ByteSize>,

    /// Transports the benchmark samples from, uniformly at random.
    pub transports: Vec<Transport>,

    /// Logging configuration.
    pub logging: Logging,

    /// Metric export configuration.
    pub metrics: Metrics,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment: "development".into(),
            iterations: 1_000_000,
            workers: 1,
            object_sizes: vec![ByteSize::kb(100), ByteSize::mib(2), ByteSize::mb(100)],
            transports: vec![Transport {
                name: "JSON".into(),
                endpoint: "http://127.0.0.1:8888".into(),
            }],
            logging: Logging::default(),
            metrics: Metrics::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override
    /// earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `W1R3__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// The largest configured object size, which bounds the shared payload.
    pub fn max_object_size(&self) -> u64 {
        self.object_sizes
            .iter()
            .map(|size| size.0)
            .max()
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.workers >= 1, "at least one worker is required");
        anyhow::ensure!(
            !self.transports.is_empty(),
            "at least one transport is required"
        );
        anyhow::ensure!(
            !self.object_sizes.is_empty(),
            "at least one object size is required"
        );
        // Per-byte rates are undefined for empty objects.
        anyhow::ensure!(
            self.object_sizes.iter().all(|size| size.0 > 0),
            "object sizes must be greater than zero"
        );
        Ok(())
    }
}
