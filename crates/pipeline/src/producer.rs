use std::sync::Arc;

use num_complex::Complex32;
use rx_sdr::{ReceiveStatus, RxSource};

use crate::block::SampleBlock;
use crate::context::RunContext;
use crate::queue::BlockQueue;

/// Timeout handed to every receive call (UHD convention).
const RECV_TIMEOUT_SECS: f64 = 3.0;

/// Ingestion loop: owns the source, fills blocks, applies the drop
/// policy, pushes to the queue.
///
/// The producer never blocks on the queue. The source delivers at a
/// real-time rate the host cannot slow down, so the only admission
/// control is shedding full blocks once the queue is at or over the
/// drop threshold.
pub struct Producer {
    source: Box<dyn RxSource>,
    queue: Arc<BlockQueue>,
    ctx: Arc<RunContext>,
    block_len: usize,
    drop_threshold: usize,
}

impl Producer {
    pub fn new(
        source: Box<dyn RxSource>,
        queue: Arc<BlockQueue>,
        ctx: Arc<RunContext>,
        block_len: usize,
        drop_threshold: usize,
    ) -> Self {
        Self {
            source,
            queue,
            ctx,
            block_len,
            drop_threshold,
        }
    }

    /// Run until the stop signal or a fatal source failure. Consumes
    /// the producer; meant to be the body of the producer thread.
    pub fn run(mut self) {
        if let Err(e) = self.source.start_streaming() {
            log::error!("failed to start streaming: {}", e);
            return;
        }

        let mut buf = vec![Complex32::new(0.0, 0.0); self.block_len];
        let mut next_seq: u64 = 0;

        while !self.ctx.stop_requested() {
            match self.source.receive(&mut buf, RECV_TIMEOUT_SECS) {
                ReceiveStatus::Timeout => {
                    log::error!("receive timed out; source presumed dead");
                    break;
                }
                ReceiveStatus::Overflow => {
                    // The device dropped samples before we ever saw them
                    self.ctx.stats.count_overflow();
                    continue;
                }
                ReceiveStatus::Error(e) => {
                    log::error!("receive failed: {}", e);
                    break;
                }
                ReceiveStatus::Samples(n) if n == self.block_len => {
                    let block = SampleBlock::new(next_seq, buf.clone());
                    // A shed block still consumes its sequence number,
                    // so gaps in the reports point at shedding.
                    next_seq += 1;

                    if self.queue.len() >= self.drop_threshold {
                        self.ctx.stats.count_dropped();
                    } else if self.queue.push(block) {
                        self.ctx.stats.count_produced();
                    } else {
                        // Queue closed under us: shutdown is in
                        // progress. The block is discarded like a shed
                        // one so the counters still account for every
                        // successful receive.
                        self.ctx.stats.count_dropped();
                        break;
                    }
                }
                // Partial receive without an error code: discard silently
                ReceiveStatus::Samples(_) => {}
            }
        }

        self.source.stop_streaming();
        log::info!(
            "producer exiting: {} blocks enqueued, {} shed, {} device overflows",
            self.ctx.stats.produced(),
            self.ctx.stats.dropped(),
            self.ctx.stats.overflows(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rx_sdr::RxConfig;
    use std::collections::VecDeque;

    /// Source that plays back a fixed script of receive outcomes, then
    /// times out forever.
    struct ScriptedSource {
        script: VecDeque<ReceiveStatus>,
        fill: Complex32,
    }

    impl ScriptedSource {
        fn new(script: Vec<ReceiveStatus>) -> Self {
            Self {
                script: script.into(),
                fill: Complex32::new(1.0, 0.0),
            }
        }

        /// `count` full blocks followed by a timeout.
        fn full_blocks(count: usize) -> Self {
            let mut script = vec![ReceiveStatus::Samples(usize::MAX); count];
            script.push(ReceiveStatus::Timeout);
            Self::new(script)
        }
    }

    impl RxSource for ScriptedSource {
        fn configure(&mut self, cfg: &RxConfig) -> Result<RxConfig, String> {
            Ok(*cfg)
        }

        fn start_streaming(&mut self) -> Result<(), String> {
            Ok(())
        }

        fn stop_streaming(&mut self) {}

        fn receive(&mut self, buf: &mut [Complex32], _timeout_secs: f64) -> ReceiveStatus {
            match self.script.pop_front() {
                Some(ReceiveStatus::Samples(n)) => {
                    let n = n.min(buf.len());
                    for s in buf[..n].iter_mut() {
                        *s = self.fill;
                    }
                    ReceiveStatus::Samples(n)
                }
                Some(status) => status,
                None => ReceiveStatus::Timeout,
            }
        }
    }

    fn run_producer(source: ScriptedSource, threshold: usize) -> (Arc<BlockQueue>, Arc<RunContext>) {
        let ctx = Arc::new(RunContext::new());
        let queue = Arc::new(BlockQueue::new(ctx.clone()));
        let producer = Producer::new(Box::new(source), queue.clone(), ctx.clone(), 64, threshold);
        producer.run();
        (queue, ctx)
    }

    #[test]
    fn test_full_blocks_are_enqueued_in_order() {
        let (queue, ctx) = run_producer(ScriptedSource::full_blocks(10), 1000);
        assert_eq!(ctx.stats.produced(), 10);
        assert_eq!(ctx.stats.dropped(), 0);
        for seq in 0..10 {
            assert_eq!(queue.pop().unwrap().seq, seq);
        }
    }

    #[test]
    fn test_drop_policy_sheds_over_threshold() {
        // 200 fast blocks, nobody consuming, threshold 50
        let (queue, ctx) = run_producer(ScriptedSource::full_blocks(200), 50);
        assert_eq!(ctx.stats.produced(), 50);
        assert_eq!(ctx.stats.dropped(), 150);
        assert_eq!(queue.len(), 50);
        assert!(ctx.stats.max_queue_depth() <= 50);
        // produced + dropped accounts for every successful receive
        assert_eq!(ctx.stats.produced() + ctx.stats.dropped(), 200);
    }

    #[test]
    fn test_shed_blocks_consume_sequence_numbers() {
        let (queue, _ctx) = run_producer(ScriptedSource::full_blocks(60), 50);
        queue.close();
        let mut last = None;
        while let Some(block) = queue.pop() {
            last = Some(block.seq);
        }
        // Only 0..=49 were enqueued; 50..=59 were shed but numbered
        assert_eq!(last, Some(49));
    }

    #[test]
    fn test_overflow_is_counted_and_skipped() {
        let source = ScriptedSource::new(vec![
            ReceiveStatus::Samples(usize::MAX),
            ReceiveStatus::Overflow,
            ReceiveStatus::Overflow,
            ReceiveStatus::Samples(usize::MAX),
            ReceiveStatus::Timeout,
        ]);
        let (queue, ctx) = run_producer(source, 1000);
        assert_eq!(ctx.stats.overflows(), 2);
        assert_eq!(ctx.stats.produced(), 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_partial_receive_is_discarded_silently() {
        let source = ScriptedSource::new(vec![
            ReceiveStatus::Samples(10), // partial: block_len is 64
            ReceiveStatus::Samples(usize::MAX),
            ReceiveStatus::Timeout,
        ]);
        let (queue, ctx) = run_producer(source, 1000);
        assert_eq!(ctx.stats.produced(), 1);
        assert_eq!(ctx.stats.dropped(), 0);
        assert_eq!(queue.len(), 1);
        // The partial never consumed a sequence number
        assert_eq!(queue.pop().unwrap().seq, 0);
    }

    #[test]
    fn test_block_received_during_shutdown_is_counted_as_shed() {
        let ctx = Arc::new(RunContext::new());
        let queue = Arc::new(BlockQueue::new(ctx.clone()));
        // Shutdown already closed the queue when the receive lands
        queue.close();

        let source = ScriptedSource::full_blocks(1);
        Producer::new(Box::new(source), queue, ctx.clone(), 64, 1000).run();

        assert_eq!(ctx.stats.produced(), 0);
        assert_eq!(ctx.stats.dropped(), 1);
        // Every successful receive is accounted for
        assert_eq!(ctx.stats.produced() + ctx.stats.dropped(), 1);
    }

    #[test]
    fn test_fatal_error_stops_the_loop() {
        let source = ScriptedSource::new(vec![
            ReceiveStatus::Samples(usize::MAX),
            ReceiveStatus::Error("device unplugged".to_string()),
            // Never reached
            ReceiveStatus::Samples(usize::MAX),
        ]);
        let (_queue, ctx) = run_producer(source, 1000);
        assert_eq!(ctx.stats.produced(), 1);
    }
}
