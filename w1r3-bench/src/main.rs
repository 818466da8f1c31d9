//! Continuous "write once, read three times" benchmark for storage services.
//!
//! Each worker repeatedly uploads an object of a randomly chosen size over a
//! randomly chosen transport, reads it back three times and deletes it.
//! Every upload and download is measured for latency, CPU usage per byte and
//! allocated memory per byte; the results are exported as OTLP histograms so
//! deployments in different languages and environments can be compared on
//! the same dashboards.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use argh::FromArgs;
use uuid::Uuid;
use w1r3_instrument::alloc::{CountingAllocator, HeapSampler};
use w1r3_instrument::gc::NoGc;
use w1r3_instrument::{Instrument, Samplers};

use crate::config::Config;
use crate::remote::{HttpRemote, ObjectClient};
use crate::worker::{Transport, WorkerConfig, make_payload, run_worker};

mod config;
mod observability;
mod remote;
mod worker;

// Allocation accounting relies on every allocation in the process going
// through the counting allocator.
#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator::new();

/// Continuous W1R3 benchmark for storage services
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    observability::initialize_tracing(&config);
    tracing::debug!(?config);

    let instance = Uuid::new_v4();
    let provider = observability::initialize_metrics(&config, instance)?;
    let histograms = observability::make_histograms(&config.metrics.prefix);

    let samplers = Samplers::probe(Some(HeapSampler::global()), Arc::new(NoGc));
    let instrument = Arc::new(Instrument::new(
        samplers,
        Arc::new(histograms.latency),
        Arc::new(histograms.cpu_per_byte),
        Arc::new(histograms.allocated_per_byte),
    ));

    let transports: Vec<_> = config
        .transports
        .iter()
        .map(|transport| Transport {
            name: transport.name.clone(),
            client: Arc::new(HttpRemote::new(&transport.endpoint)) as Arc<dyn ObjectClient>,
        })
        .collect();

    let worker_config = WorkerConfig {
        iterations: config.iterations,
        object_sizes: config.object_sizes.iter().map(|size| size.0).collect(),
        transports,
        deployment: config.deployment.clone(),
        instance,
    };

    let payload = make_payload(config.max_object_size(), rand::random());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    tracing::info!(
        %instance,
        workers = config.workers,
        iterations = config.iterations,
        "starting benchmark"
    );

    runtime.block_on(async {
        let tasks: Vec<_> = (0..config.workers)
            .map(|_| {
                tokio::spawn(run_worker(
                    worker_config.clone(),
                    instrument.clone(),
                    payload.clone(),
                    rand::random(),
                ))
            })
            .collect();

        for task in futures::future::join_all(tasks).await {
            task.context("worker task panicked")??;
        }

        anyhow::Ok(())
    })?;

    if let Some(provider) = provider {
        // Push whatever the periodic reader has not exported yet.
        provider.force_flush().context("failed to flush metrics")?;
        provider.shutdown().context("failed to shut down metrics")?;
    }

    tracing::info!("benchmark finished");
    Ok(())
}
