//! Garbage-collection monitoring.
//!
//! Native Rust has no managed collector, but the measurement math is shared
//! with managed-runtime embeddings of this benchmark, and the bounded
//! force-and-await contract is part of the measurement design. The monitor is
//! an explicit, injectable service: the process constructs one implementation
//! at startup and hands it to the instrument by reference. There is no hidden
//! global state; whatever listener registration a backend needs happens once,
//! at its construction.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

/// Default upper bound for [`GcMonitor::force_and_await`].
///
/// A collector is not guaranteed to run promptly; without this bound a
/// measurement stall would turn into a benchmark hang.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Memory pool classification, mirroring managed-runtime accounting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PoolKind {
    /// Collector-managed heap region.
    Heap,
    /// Runtime memory outside the collected heap (code caches, metadata).
    NonHeap,
}

/// Usage of one named allocator region at an instant.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolUsage {
    /// Region name as reported by the runtime.
    pub name: String,
    /// Whether the region belongs to the collected heap.
    pub kind: PoolKind,
    /// Bytes in use, `-1` when the runtime did not report a value.
    pub used_bytes: i64,
}

/// Per-pool heap usage around one completed collection cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GcReading {
    /// Count of collection cycles observed so far.
    pub epoch: u64,
    /// Heap pool usage immediately before the collection ran.
    pub pre: Vec<PoolUsage>,
    /// Heap pool usage immediately after the collection finished.
    pub post: Vec<PoolUsage>,
}

/// A process-wide garbage-collection monitor.
///
/// [`force_and_await`](Self::force_and_await) requests a collection cycle and
/// blocks until one completes or `max_wait` elapses, then returns the
/// freshest reading it has. A timeout is a degrade-and-continue condition,
/// never an error, and the bound applies per call.
pub trait GcMonitor: fmt::Debug + Send + Sync {
    /// Count of collection cycles observed so far. A value that never
    /// changes means "no managed collector"; the measurement layer then
    /// skips heap-delta accounting entirely.
    fn epoch(&self) -> u64;

    /// Requests a collection and waits, bounded, for it to complete.
    fn force_and_await(&self, max_wait: Duration) -> Option<GcReading>;
}

/// Monitor for runtimes without a managed collector.
///
/// The epoch never advances and no heap readings exist, which makes the
/// measurement layer fall back to allocator-counter or RSS accounting.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGc;

impl GcMonitor for NoGc {
    fn epoch(&self) -> u64 {
        0
    }

    fn force_and_await(&self, _max_wait: Duration) -> Option<GcReading> {
        None
    }
}

/// Snapshot source for runtime memory pools (heap and non-heap).
///
/// Native runtimes have none; managed-runtime embeddings report their
/// allocator regions here so that non-heap growth can be subtracted from the
/// resident-set delta instead of being double counted.
pub trait PoolsSampler: fmt::Debug + Send + Sync {
    /// Current usage of every pool.
    fn sample(&self) -> Vec<PoolUsage>;
}

/// Event source backing a [`PollingGcMonitor`].
///
/// Implementations register with their runtime's collector notification
/// mechanism once, at construction, and keep the most recent completed
/// collection available for polling.
pub trait GcBackend: fmt::Debug + Send + Sync {
    /// Asks the runtime to schedule a collection cycle.
    fn request_cycle(&self);

    /// The most recent completed collection, if any, together with the
    /// monotonic instant at which it was observed.
    fn last_event(&self) -> Option<(Instant, GcReading)>;
}

/// Polls a [`GcBackend`] for the next collection cycle, with a bounded wait.
#[derive(Debug)]
pub struct PollingGcMonitor<B> {
    backend: B,
}

impl<B: GcBackend> PollingGcMonitor<B> {
    /// Wraps the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: GcBackend> GcMonitor for PollingGcMonitor<B> {
    fn epoch(&self) -> u64 {
        self.backend
            .last_event()
            .map(|(_, reading)| reading.epoch)
            .unwrap_or(0)
    }

    fn force_and_await(&self, max_wait: Duration) -> Option<GcReading> {
        let begin = Instant::now();
        self.backend.request_cycle();
        loop {
            match self.backend.last_event() {
                Some((seen, reading)) if seen >= begin => return Some(reading),
                stale => {
                    if begin.elapsed() > max_wait {
                        // Give up and report the last-known state rather
                        // than hanging the benchmark.
                        return stale.map(|(_, reading)| reading);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn heap_pool(used_bytes: i64) -> PoolUsage {
        PoolUsage {
            name: "eden".into(),
            kind: PoolKind::Heap,
            used_bytes,
        }
    }

    #[derive(Debug, Default)]
    struct StalledBackend {
        last: Option<(Instant, GcReading)>,
    }

    impl GcBackend for StalledBackend {
        fn request_cycle(&self) {}

        fn last_event(&self) -> Option<(Instant, GcReading)> {
            self.last.clone()
        }
    }

    #[derive(Debug)]
    struct PromptBackend {
        last: Mutex<Option<(Instant, GcReading)>>,
    }

    impl GcBackend for PromptBackend {
        fn request_cycle(&self) {
            let reading = GcReading {
                epoch: 1,
                pre: vec![heap_pool(2048)],
                post: vec![heap_pool(512)],
            };
            *self.last.lock().unwrap() = Some((Instant::now(), reading));
        }

        fn last_event(&self) -> Option<(Instant, GcReading)> {
            self.last.lock().unwrap().clone()
        }
    }

    #[test]
    fn stalled_collector_times_out_within_bound() {
        let monitor = PollingGcMonitor::new(StalledBackend::default());

        let start = Instant::now();
        let reading = monitor.force_and_await(Duration::from_millis(200));
        let elapsed = start.elapsed();

        assert!(reading.is_none());
        // Generous slack for the final poll sleep; the point is that the
        // call returns in the same order of magnitude as the bound, not
        // that it hangs.
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }

    #[test]
    fn stale_reading_is_returned_on_timeout() {
        let stale = GcReading {
            epoch: 7,
            pre: vec![heap_pool(100)],
            post: vec![heap_pool(10)],
        };
        let backend = StalledBackend {
            last: Some((Instant::now(), stale.clone())),
        };
        // Make sure the stored event predates the force-and-await call.
        thread::sleep(Duration::from_millis(10));
        let monitor = PollingGcMonitor::new(backend);

        let reading = monitor.force_and_await(Duration::from_millis(50));
        assert_eq!(reading, Some(stale));
    }

    #[test]
    fn fresh_cycle_is_returned_promptly() {
        let monitor = PollingGcMonitor::new(PromptBackend {
            last: Mutex::new(None),
        });

        let start = Instant::now();
        let reading = monitor.force_and_await(Duration::from_secs(5)).unwrap();

        assert_eq!(reading.epoch, 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(monitor.epoch(), 1);
    }

    #[test]
    fn no_gc_returns_immediately() {
        let start = Instant::now();
        assert!(NoGc.force_and_await(Duration::from_secs(5)).is_none());
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(NoGc.epoch(), 0);
    }
}
