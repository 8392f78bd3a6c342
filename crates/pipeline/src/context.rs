use std::sync::atomic::{AtomicBool, Ordering};

use crate::stats::PipelineStats;

/// Shared per-run state: the one-shot stop signal and the pipeline
/// counters. Constructed once by the controller and handed to the
/// producer and every worker behind an `Arc`.
pub struct RunContext {
    stop: AtomicBool,
    pub stats: PipelineStats,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            stats: PipelineStats::new(),
        }
    }

    /// The stop signal only ever transitions false -> true.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
