//! Measurement primitives for the W1R3 storage benchmark.
//!
//! The benchmark repeatedly uploads an object and reads it back three times
//! ("write once, read three times"). This crate provides the instrumentation
//! around each of those operations: point-in-time [`ResourceSnapshot`]s of
//! wall clock, CPU time, allocation activity and resident memory, the
//! begin/end [`Measurement`] lifecycle that turns two snapshots into
//! normalized per-byte rates, and the deterministic histogram bucket
//! [`boundaries`] those rates are recorded against.
//!
//! Snapshots are symmetric by construction: the begin side reads the heavy,
//! noisy dimensions (resident memory, forced collection) first and the wall
//! clock last, the end side is the exact mirror. Systematic read overhead
//! then cancels in the subtraction instead of inflating the latency figure.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod alloc;
pub mod boundaries;
pub mod cpu;
pub mod error;
pub mod gc;
pub mod measure;
pub mod rss;
pub mod snapshot;

pub use crate::error::InstrumentError;
pub use crate::measure::{HistogramSink, Instrument, Measurement};
pub use crate::snapshot::{ResourceSnapshot, Samplers};
