//! Point-in-time resource snapshots and the delta math between them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::alloc::HeapSampler;
use crate::cpu::CpuTimeSampler;
use crate::gc::{GcMonitor, GcReading, PoolKind, PoolUsage, PoolsSampler};
use crate::rss::{RssSampler, SetSize};

/// The set of samplers feeding snapshots.
///
/// Optional samplers that fail to probe stay `None`; the affected histogram
/// streams are then simply not reported while the rest of the measurement
/// keeps working.
#[derive(Clone, Debug)]
pub struct Samplers {
    /// Process CPU time, if the platform clock is available.
    pub cpu: Option<CpuTimeSampler>,
    /// Resident set size via procfs, if available.
    pub rss: Option<RssSampler>,
    /// Allocation counter, when the counting allocator is installed.
    pub heap: Option<HeapSampler>,
    /// Runtime memory pools; `None` on native runtimes.
    pub pools: Option<Arc<dyn PoolsSampler>>,
    /// Collector monitor; [`NoGc`](crate::gc::NoGc) on native runtimes.
    pub gc: Arc<dyn GcMonitor>,
}

impl Samplers {
    /// Probes all platform samplers, logging unavailable ones once.
    pub fn probe(heap: Option<HeapSampler>, gc: Arc<dyn GcMonitor>) -> Self {
        let cpu = CpuTimeSampler::probe();
        if cpu.is_none() {
            tracing::warn!("process CPU clock unavailable, cpu histogram will not be reported");
        }
        let rss = RssSampler::probe();
        if rss.is_none() {
            tracing::warn!("smaps rollup unavailable, memory accounting degraded");
        }
        Self {
            cpu,
            rss,
            heap,
            pools: None,
            gc,
        }
    }
}

/// Readings of every resource dimension, captured at one instant.
///
/// The capture order is fixed and mirrored between [`begin`](Self::begin) and
/// [`end`](Self::end): the wall clock is the most sensitive to measurement
/// overhead, so its reads bracket the operation as tightly as possible while
/// the heavier reads (resident memory, forced collection) sit outside the
/// bracket, where their cost cancels in the subtraction.
#[derive(Clone, Debug)]
pub struct ResourceSnapshot {
    pub(crate) wall: Instant,
    pub(crate) cpu_nanos: Option<i64>,
    pub(crate) allocated_bytes: Option<u64>,
    pub(crate) set_size: Option<SetSize>,
    pub(crate) pools: Vec<PoolUsage>,
    pub(crate) gc: Option<GcReading>,
}

impl ResourceSnapshot {
    /// Takes the begin-side snapshot: memory → pools → GC → CPU → wall.
    pub fn begin(samplers: &Samplers, gc_wait: Duration) -> Self {
        let set_size = samplers.rss.as_ref().and_then(RssSampler::sample);
        let pools = sample_pools(samplers);
        let allocated_bytes = samplers.heap.map(|heap| heap.sample());
        let gc = samplers.gc.force_and_await(gc_wait);
        let cpu_nanos = samplers.cpu.and_then(|cpu| cpu.sample());
        let wall = Instant::now();
        Self {
            wall,
            cpu_nanos,
            allocated_bytes,
            set_size,
            pools,
            gc,
        }
    }

    /// Takes the end-side snapshot: wall → CPU → GC → pools → memory.
    pub fn end(samplers: &Samplers, gc_wait: Duration) -> Self {
        let wall = Instant::now();
        let cpu_nanos = samplers.cpu.and_then(|cpu| cpu.sample());
        let gc = samplers.gc.force_and_await(gc_wait);
        let allocated_bytes = samplers.heap.map(|heap| heap.sample());
        let pools = sample_pools(samplers);
        let set_size = samplers.rss.as_ref().and_then(RssSampler::sample);
        Self {
            wall,
            cpu_nanos,
            allocated_bytes,
            set_size,
            pools,
            gc,
        }
    }
}

fn sample_pools(samplers: &Samplers) -> Vec<PoolUsage> {
    samplers
        .pools
        .as_ref()
        .map(|pools| pools.sample())
        .unwrap_or_default()
}

/// Normalized per-byte rates derived from a begin/end snapshot pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedRates {
    /// Wall-clock duration of the operation, in seconds.
    pub latency_seconds: f64,
    /// CPU nanoseconds consumed per transferred byte.
    pub cpu_nanos_per_byte: Option<f64>,
    /// Bytes allocated per transferred byte.
    pub allocated_per_byte: Option<f64>,
}

pub(crate) fn normalize(
    begin: &ResourceSnapshot,
    end: &ResourceSnapshot,
    object_size: u64,
) -> NormalizedRates {
    debug_assert!(object_size > 0);
    let latency_seconds = end.wall.duration_since(begin.wall).as_secs_f64();

    let cpu_nanos_per_byte = match (begin.cpu_nanos, end.cpu_nanos) {
        (Some(b), Some(e)) => Some((e - b) as f64 / object_size as f64),
        _ => None,
    };

    let allocated_per_byte =
        bytes_allocated(begin, end).map(|bytes| bytes as f64 / object_size as f64);

    NormalizedRates {
        latency_seconds,
        cpu_nanos_per_byte,
        allocated_per_byte,
    }
}

/// Best-effort bytes allocated during the interval.
///
/// With collector readings on both sides, heap growth that survived the
/// begin-side collection combines with resident-set growth, minus non-heap
/// pool growth that the resident set already includes. Without a collector
/// the allocation counter is authoritative, and plain RSS growth is the last
/// resort. Negative results indicate noise, not data, and clamp to zero.
fn bytes_allocated(begin: &ResourceSnapshot, end: &ResourceSnapshot) -> Option<u64> {
    let rss_delta = match (begin.set_size, end.set_size) {
        (Some(b), Some(e)) if b.rss_bytes >= 0 && e.rss_bytes >= 0 => {
            Some(e.rss_bytes - b.rss_bytes)
        }
        _ => None,
    };

    if let (Some(b), Some(e)) = (&begin.gc, &end.gc) {
        let heap_used = heap_used_between(b, e);
        let non_heap = non_heap_growth(&begin.pools, &end.pools);
        let total = heap_used + rss_delta.unwrap_or(0) - non_heap;
        return Some(total.max(0) as u64);
    }

    if let (Some(b), Some(e)) = (begin.allocated_bytes, end.allocated_bytes) {
        return Some(e.saturating_sub(b));
    }

    rss_delta.map(|delta| delta.max(0) as u64)
}

/// Heap bytes allocated during the interval and not yet reclaimed: per pool,
/// usage right before the end-side collection minus usage right after the
/// begin-side collection. Only positive contributions count, since a
/// collection shrinking a pool below its starting point is not allocation.
pub(crate) fn heap_used_between(begin: &GcReading, end: &GcReading) -> i64 {
    end.pre
        .iter()
        .map(|pool| {
            let before = begin
                .post
                .iter()
                .find(|p| p.name == pool.name)
                .map(|p| p.used_bytes)
                .unwrap_or(0);
            (pool.used_bytes - before).max(0)
        })
        .sum()
}

/// Growth of non-heap pools between the snapshots, clamped at zero per pool.
pub(crate) fn non_heap_growth(begin: &[PoolUsage], end: &[PoolUsage]) -> i64 {
    end.iter()
        .filter(|pool| pool.kind == PoolKind::NonHeap)
        .map(|pool| {
            let before = begin
                .iter()
                .find(|p| p.name == pool.name && p.kind == PoolKind::NonHeap)
                .map(|p| p.used_bytes)
                .unwrap_or(0);
            (pool.used_bytes - before).max(0)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::NoGc;

    fn pool(name: &str, kind: PoolKind, used_bytes: i64) -> PoolUsage {
        PoolUsage {
            name: name.into(),
            kind,
            used_bytes,
        }
    }

    fn synthetic(
        wall: Instant,
        cpu_nanos: Option<i64>,
        allocated_bytes: Option<u64>,
        rss_bytes: i64,
    ) -> ResourceSnapshot {
        ResourceSnapshot {
            wall,
            cpu_nanos,
            allocated_bytes,
            set_size: Some(SetSize {
                rss_bytes,
                pss_bytes: -1,
            }),
            pools: Vec::new(),
            gc: None,
        }
    }

    #[test]
    fn normalization_is_exact() {
        let t0 = Instant::now();
        let begin = synthetic(t0, Some(0), Some(0), 0);
        let end = synthetic(t0, Some(500_000), Some(0), 0);

        let rates = normalize(&begin, &end, 1000);
        assert_eq!(rates.cpu_nanos_per_byte, Some(500.0));
    }

    #[test]
    fn end_to_end_scenario() {
        let t0 = Instant::now();
        let begin = synthetic(t0, Some(0), Some(0), 0);
        let end = synthetic(
            t0 + Duration::from_millis(50),
            Some(10_000_000),
            Some(0),
            0,
        );

        let rates = normalize(&begin, &end, 2_097_152);
        assert_eq!(rates.latency_seconds, 0.05);
        let cpu = rates.cpu_nanos_per_byte.unwrap();
        assert!((cpu - 4.768).abs() < 0.001, "cpu per byte was {cpu}");
    }

    #[test]
    fn missing_cpu_sampler_yields_no_rate() {
        let t0 = Instant::now();
        let begin = synthetic(t0, None, Some(0), 0);
        let end = synthetic(t0, Some(1), Some(0), 0);

        let rates = normalize(&begin, &end, 1000);
        assert_eq!(rates.cpu_nanos_per_byte, None);
    }

    #[test]
    fn allocation_counter_delta_is_used_without_gc() {
        let t0 = Instant::now();
        // RSS shrank during the interval; the counter still knows what was
        // allocated.
        let begin = synthetic(t0, Some(0), Some(1_000_000), 8_000_000);
        let end = synthetic(t0, Some(0), Some(1_500_000), 7_000_000);

        let rates = normalize(&begin, &end, 1000);
        assert_eq!(rates.allocated_per_byte, Some(500.0));
    }

    #[test]
    fn rss_fallback_clamps_at_zero() {
        let t0 = Instant::now();
        let begin = synthetic(t0, Some(0), None, 8_000_000);
        let end = synthetic(t0, Some(0), None, 7_000_000);

        let rates = normalize(&begin, &end, 1000);
        assert_eq!(rates.allocated_per_byte, Some(0.0));
    }

    #[test]
    fn heap_delta_clamps_shrinking_pools() {
        let begin = GcReading {
            epoch: 1,
            pre: vec![pool("eden", PoolKind::Heap, 9000)],
            post: vec![pool("eden", PoolKind::Heap, 5000)],
        };
        // Usage before the end-side collection dropped below the begin-side
        // post-collection level: the contribution must be zero, not negative.
        let end = GcReading {
            epoch: 2,
            pre: vec![pool("eden", PoolKind::Heap, 3000)],
            post: vec![pool("eden", PoolKind::Heap, 1000)],
        };
        assert_eq!(heap_used_between(&begin, &end), 0);

        let growing = GcReading {
            epoch: 2,
            pre: vec![pool("eden", PoolKind::Heap, 7500)],
            post: vec![pool("eden", PoolKind::Heap, 1000)],
        };
        assert_eq!(heap_used_between(&begin, &growing), 2500);
    }

    #[test]
    fn non_heap_growth_is_clamped_per_pool() {
        let begin = vec![
            pool("metaspace", PoolKind::NonHeap, 1000),
            pool("code-cache", PoolKind::NonHeap, 2000),
            pool("eden", PoolKind::Heap, 50_000),
        ];
        let end = vec![
            pool("metaspace", PoolKind::NonHeap, 1600),
            pool("code-cache", PoolKind::NonHeap, 500),
            pool("eden", PoolKind::Heap, 90_000),
        ];
        // metaspace grew by 600, code-cache shrank (clamped to 0), heap pools
        // are not non-heap.
        assert_eq!(non_heap_growth(&begin, &end), 600);
    }

    #[test]
    fn managed_path_combines_heap_rss_and_non_heap() {
        let t0 = Instant::now();
        let mut begin = synthetic(t0, Some(0), None, 1_000_000);
        begin.gc = Some(GcReading {
            epoch: 1,
            pre: vec![pool("eden", PoolKind::Heap, 4000)],
            post: vec![pool("eden", PoolKind::Heap, 1000)],
        });
        begin.pools = vec![pool("metaspace", PoolKind::NonHeap, 500)];

        let mut end = synthetic(t0, Some(0), None, 1_002_000);
        end.gc = Some(GcReading {
            epoch: 2,
            pre: vec![pool("eden", PoolKind::Heap, 6000)],
            post: vec![pool("eden", PoolKind::Heap, 1500)],
        });
        end.pools = vec![pool("metaspace", PoolKind::NonHeap, 1500)];

        // heap_used = 6000 - 1000 = 5000; rss_delta = 2000; non_heap = 1000.
        let rates = normalize(&begin, &end, 1000);
        assert_eq!(rates.allocated_per_byte, Some(6.0));
    }

    #[test]
    fn begin_and_end_snapshots_mirror() {
        let samplers = Samplers {
            cpu: CpuTimeSampler::probe(),
            rss: RssSampler::probe(),
            heap: None,
            pools: None,
            gc: Arc::new(NoGc),
        };

        let begin = ResourceSnapshot::begin(&samplers, Duration::from_millis(10));
        let end = ResourceSnapshot::end(&samplers, Duration::from_millis(10));

        assert!(end.wall >= begin.wall);
        assert_eq!(begin.cpu_nanos.is_some(), end.cpu_nanos.is_some());
        assert!(begin.gc.is_none());
        assert!(begin.pools.is_empty());
    }
}
