//! The benchmark worker loop.
//!
//! Each worker runs the configured number of iterations. An iteration picks a
//! transport and an object size at random, uploads a slice of the shared
//! payload under a fresh object name, reads it back three times, and finally
//! deletes it. Every upload and download is wrapped in a measurement session;
//! the delete is bookkeeping and stays unmeasured.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use opentelemetry::KeyValue;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::Instrument as _;
use uuid::Uuid;
use w1r3_instrument::Instrument;

use crate::remote::ObjectClient;

/// Downloads per uploaded object, the "R3" in W1R3.
pub const READS_PER_WRITE: usize = 3;

/// A named storage endpoint, shared across workers.
#[derive(Clone, Debug)]
pub struct Transport {
    /// Transport label, recorded as the `ssb.transport` attribute.
    pub name: String,
    /// The client for this endpoint.
    pub client: Arc<dyn ObjectClient>,
}

/// Parameters shared by all workers.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Iterations to run before the worker exits.
    pub iterations: u64,
    /// Object sizes to sample from, all non-zero.
    pub object_sizes: Vec<u64>,
    /// Transports to sample from.
    pub transports: Vec<Transport>,
    /// Deployment label, recorded as `ssb.deployment`.
    pub deployment: String,
    /// Unique id of this benchmark process, recorded as `ssb.instance`.
    pub instance: Uuid,
}

/// Fills a shared payload buffer with `max_size` bytes of seeded random data.
///
/// Workers slice prefixes out of this buffer instead of generating payloads
/// per iteration, which keeps payload generation out of the allocation and
/// CPU measurements.
pub fn make_payload(max_size: u64, seed: u64) -> Bytes {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut data = vec![0u8; max_size as usize];
    rng.fill_bytes(&mut data);
    Bytes::from(data)
}

/// Runs one worker to completion.
pub async fn run_worker(
    config: WorkerConfig,
    instrument: Arc<Instrument>,
    payload: Bytes,
    seed: u64,
) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);

    for iteration in 0..config.iterations {
        let object_size = config.object_sizes[rng.random_range(0..config.object_sizes.len())];
        let transport = &config.transports[rng.random_range(0..config.transports.len())];
        let object = Uuid::new_v4().to_string();

        let span = tracing::info_span!(
            "iteration",
            iteration,
            object_size,
            transport = transport.name,
        );
        run_iteration(
            &config,
            &instrument,
            transport,
            &object,
            payload.slice(..object_size as usize),
        )
        .instrument(span)
        .await?;
    }

    Ok(())
}

/// One full upload, read-three-times, delete cycle.
///
/// Only infrastructure failures propagate as errors; a failed storage
/// operation is logged, skips its measurement, and the iteration moves on.
/// The one exception is a failed upload, which abandons the whole iteration
/// since there is nothing to read or delete.
async fn run_iteration(
    config: &WorkerConfig,
    instrument: &Instrument,
    transport: &Transport,
    object: &str,
    payload: Bytes,
) -> Result<()> {
    let object_size = payload.len() as u64;
    let common_attributes = [
        KeyValue::new("ssb.language", "rust"),
        KeyValue::new("ssb.object-size", object_size as i64),
        KeyValue::new("ssb.transport", transport.name.clone()),
        KeyValue::new("ssb.deployment", config.deployment.clone()),
        KeyValue::new("ssb.instance", config.instance.to_string()),
        KeyValue::new("ssb.version", env!("CARGO_PKG_VERSION")),
    ];

    let attributes = |op: String| {
        let mut attributes = common_attributes.to_vec();
        attributes.push(KeyValue::new("ssb.op", op));
        attributes
    };

    let span = tracing::info_span!("upload", object);
    let measurement = instrument.measure(object_size, attributes("UPLOAD".into()))?;
    match transport
        .client
        .upload(object, payload)
        .instrument(span.clone())
        .await
    {
        Ok(()) => measurement.report(),
        Err(error) => {
            // Nothing was stored; downloads and the delete are pointless.
            span.in_scope(|| tracing::error!("upload failed: {error:#}"));
            return Ok(());
        }
    }

    for read in 0..READS_PER_WRITE {
        let span = tracing::info_span!("download", object, read);
        let measurement = instrument.measure(object_size, attributes(format!("READ[{read}]")))?;
        match transport
            .client
            .download(object)
            .instrument(span.clone())
            .await
        {
            Ok(_received) => measurement.report(),
            Err(error) => {
                span.in_scope(|| tracing::error!("download failed: {error:#}"));
            }
        }
    }

    // Best effort; a leaked object costs storage, not correctness.
    if let Err(error) = transport.client.delete(object).await {
        tracing::warn!("delete of `{object}` failed: {error:#}");
    }

    Ok(())
}
