use std::sync::Arc;

use crate::queue::BlockQueue;
use crate::sink::{BlockReport, ReportSink};

/// One consumer loop: pop, compute average power, report.
///
/// Workers share nothing mutable beyond the queue and the sink. Each
/// pop transfers exclusive ownership of a block, so no block is ever
/// processed twice; a single worker's stream of sequence numbers is
/// generally non-contiguous.
pub struct Worker {
    id: usize,
    queue: Arc<BlockQueue>,
    sink: Arc<dyn ReportSink>,
}

impl Worker {
    pub fn new(id: usize, queue: Arc<BlockQueue>, sink: Arc<dyn ReportSink>) -> Self {
        Self { id, queue, sink }
    }

    /// Run until the queue reports closed. Returns the number of
    /// blocks this worker processed.
    pub fn run(self) -> u64 {
        let mut processed: u64 = 0;

        while let Some(block) = self.queue.pop() {
            let avg_power = block.avg_power();
            self.sink.report(&BlockReport {
                worker_id: self.id,
                seq: block.seq,
                avg_power,
                queue_depth: self.queue.len(),
            });
            processed += 1;
        }

        log::debug!("worker {} exiting after {} blocks", self.id, processed);
        processed
    }
}
