//! Deterministic histogram bucket boundaries.
//!
//! Every process in a benchmark fleet must compute bit-identical boundaries,
//! otherwise the backend cannot merge their histograms. The schedules below
//! use only integer arithmetic or exactly-representable binary fractions, so
//! the result does not depend on floating-point evaluation order.

/// Upper bound on the number of boundaries any schedule may produce.
pub const MAX_BUCKETS: usize = 200;

/// The three histogram streams reported per operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HistogramKind {
    /// Operation latency in seconds.
    Latency,
    /// CPU nanoseconds per transferred byte.
    CpuPerByte,
    /// Allocated bytes per transferred byte.
    AllocatedPerByte,
}

/// Builds the bucket boundaries for the given histogram stream.
///
/// Pure function of its input; every call returns the same vector.
pub fn build(kind: HistogramKind) -> Vec<f64> {
    match kind {
        HistogramKind::Latency => latency(),
        HistogramKind::CpuPerByte => octaves(0.125, 32),
        HistogramKind::AllocatedPerByte => octaves(0.0625, 16),
    }
}

/// Latency boundaries in seconds.
///
/// 50 buckets of 2ms resolve the small-object range, then the step starts at
/// 10ms and doubles every 10 buckets until the boundary reaches 300s. The
/// accumulation runs in integer milliseconds; conversion to seconds happens
/// only at emission.
fn latency() -> Vec<f64> {
    let mut boundaries = Vec::new();
    let mut boundary_ms: u64 = 0;
    for _ in 0..50 {
        boundaries.push(boundary_ms as f64 / 1000.0);
        boundary_ms += 2;
    }
    let mut increment_ms: u64 = 10;
    for i in 0..150 {
        if boundary_ms >= 300_000 {
            break;
        }
        boundaries.push(boundary_ms as f64 / 1000.0);
        if i != 0 && i % 10 == 0 {
            increment_ms *= 2;
        }
        boundary_ms += increment_ms;
    }
    boundaries
}

/// Boundaries that grow geometrically in octaves: starting at zero, each
/// bucket adds `increment`, and the increment doubles every `group` buckets.
/// `increment` must be a power of two so every boundary is exact in binary
/// floating point.
fn octaves(increment: f64, group: usize) -> Vec<f64> {
    let mut boundaries = Vec::with_capacity(MAX_BUCKETS);
    let mut boundary = 0.0;
    let mut increment = increment;
    for i in 0..MAX_BUCKETS {
        boundaries.push(boundary);
        if i != 0 && i % group == 0 {
            increment *= 2.0;
        }
        boundary += increment;
    }
    boundaries
}
