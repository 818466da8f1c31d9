//! The measurement session API.
//!
//! One [`Instrument`] per process wraps the samplers and the three histogram
//! streams. Each measured operation opens a [`Measurement`] right before the
//! work starts and reports it right after the work succeeds; a failed
//! operation simply drops the session and nothing is recorded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Histogram;

use crate::error::InstrumentError;
use crate::gc::DEFAULT_MAX_WAIT;
use crate::snapshot::{self, ResourceSnapshot, Samplers};

/// Destination for one normalized histogram value.
///
/// [`Histogram<f64>`] implements this directly; tests substitute an in-memory
/// recorder.
pub trait HistogramSink: Send + Sync {
    /// Records one value with the given attributes.
    fn record(&self, value: f64, attributes: &[KeyValue]);
}

impl HistogramSink for Histogram<f64> {
    fn record(&self, value: f64, attributes: &[KeyValue]) {
        Histogram::record(self, value, attributes);
    }
}

/// Process-wide measurement facility.
pub struct Instrument {
    samplers: Samplers,
    gc_wait: Duration,
    latency: Arc<dyn HistogramSink>,
    cpu_per_byte: Arc<dyn HistogramSink>,
    allocated_per_byte: Arc<dyn HistogramSink>,
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("samplers", &self.samplers)
            .field("gc_wait", &self.gc_wait)
            .finish_non_exhaustive()
    }
}

impl Instrument {
    /// Creates an instrument over the given samplers and histogram streams.
    pub fn new(
        samplers: Samplers,
        latency: Arc<dyn HistogramSink>,
        cpu_per_byte: Arc<dyn HistogramSink>,
        allocated_per_byte: Arc<dyn HistogramSink>,
    ) -> Self {
        Self {
            samplers,
            gc_wait: DEFAULT_MAX_WAIT,
            latency,
            cpu_per_byte,
            allocated_per_byte,
        }
    }

    /// Overrides the per-snapshot bound on waiting for a forced collection.
    pub fn with_gc_wait(mut self, gc_wait: Duration) -> Self {
        self.gc_wait = gc_wait;
        self
    }

    /// Opens a measurement session for an operation transferring
    /// `object_size` bytes.
    ///
    /// A zero size is rejected before any sampling happens: per-byte rates
    /// would divide by zero and poison the histograms with non-finite values.
    pub fn measure(
        &self,
        object_size: u64,
        attributes: Vec<KeyValue>,
    ) -> Result<Measurement<'_>, InstrumentError> {
        if object_size == 0 {
            return Err(InstrumentError::InvalidObjectSize(object_size));
        }
        let begin = ResourceSnapshot::begin(&self.samplers, self.gc_wait);
        Ok(Measurement {
            instrument: self,
            object_size,
            attributes,
            begin,
        })
    }
}

/// An open measurement session.
///
/// Consumed by [`report`](Self::report) on success; dropping it without
/// reporting discards the begin-side snapshot and records nothing.
#[derive(Debug)]
pub struct Measurement<'a> {
    instrument: &'a Instrument,
    object_size: u64,
    attributes: Vec<KeyValue>,
    begin: ResourceSnapshot,
}

impl Measurement<'_> {
    /// Closes the session and records the normalized rates.
    ///
    /// Latency is always recorded. The per-byte streams are recorded only
    /// when their samplers produced data on both sides; an unavailable
    /// sampler leaves its histogram untouched rather than writing a
    /// sentinel.
    pub fn report(self) {
        let instrument = self.instrument;
        let end = ResourceSnapshot::end(&instrument.samplers, instrument.gc_wait);
        let rates = snapshot::normalize(&self.begin, &end, self.object_size);

        instrument
            .latency
            .record(rates.latency_seconds, &self.attributes);
        if let Some(cpu) = rates.cpu_nanos_per_byte {
            instrument.cpu_per_byte.record(cpu, &self.attributes);
        }
        if let Some(allocated) = rates.allocated_per_byte {
            instrument
                .allocated_per_byte
                .record(allocated, &self.attributes);
        }
    }
}
