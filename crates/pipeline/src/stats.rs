use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Process-wide pipeline counters. All fields are independent atomics
/// so the hot push/pop path never contends with reporting reads; they
/// start at zero and are never reset during a run.
#[derive(Default)]
pub struct PipelineStats {
    /// Blocks successfully enqueued by the producer
    produced: AtomicU64,
    /// Full blocks discarded by the drop policy at the queue boundary
    dropped: AtomicU64,
    /// Overflow events reported by the hardware source
    overflows: AtomicU64,
    /// Highest queue depth ever observed at push time
    max_queue_depth: AtomicUsize,
}

/// Point-in-time copy of the counters, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub produced: u64,
    pub dropped: u64,
    pub overflows: u64,
    pub max_queue_depth: usize,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold an observed queue depth into the high-water mark. fetch_max
    /// keeps the mark monotonic under concurrent updates.
    pub fn record_queue_depth(&self, depth: usize) {
        self.max_queue_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            produced: self.produced(),
            dropped: self.dropped(),
            overflows: self.overflows(),
            max_queue_depth: self.max_queue_depth(),
        }
    }
}
