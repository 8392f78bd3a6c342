use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rx_sdr::{RxConfig, RxSource};

use crate::context::RunContext;
use crate::producer::Producer;
use crate::queue::BlockQueue;
use crate::sink::ReportSink;
use crate::stats::StatsSnapshot;
use crate::worker::Worker;

/// Granularity of the controller's wait loop.
const TICK: Duration = Duration::from_millis(100);

/// Everything a run needs to know up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Requested tuning, forwarded to the source
    pub rx: RxConfig,
    /// Complex samples per block (identical for every block in a run)
    pub block_len: usize,
    /// Worker threads, fixed for the run
    pub num_workers: usize,
    /// Wall-clock run duration
    pub duration: Duration,
    /// Queue depth at or above which the producer sheds blocks
    pub drop_threshold: usize,
    /// Emit a periodic queue/counter line at this interval
    pub stats_interval: Option<Duration>,
}

/// End-of-run accounting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    /// Blocks processed by each worker, indexed by worker id - 1
    pub worker_blocks: Vec<u64>,
    pub elapsed: Duration,
    /// Tuning the source actually achieved
    pub achieved: RxConfig,
}

/// Shared flag for requesting an early stop from outside the run.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a run end to end: configure the source, start the producer
/// and worker threads, wait out the configured duration (or an early
/// stop), then shut everything down and join.
///
/// Lifecycle: idle until `run` is called; running while the threads
/// work; stopping once the stop signal is set and the queue closed;
/// terminated when every thread has been joined. The stop signal is
/// set exactly once per run. Shutdown drains the queue, so every
/// enqueued block is consumed exactly once and every received block
/// ends up consumed, shed at the queue, or counted as a device
/// overflow.
pub struct Controller {
    cfg: RunConfig,
    cancel: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(cfg: RunConfig) -> Self {
        Self {
            cfg,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for requesting an early stop (e.g. from a signal
    /// handler). May be cloned freely.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    pub fn run(
        &self,
        mut source: Box<dyn RxSource>,
        sink: Arc<dyn ReportSink>,
    ) -> Result<RunSummary, String> {
        if self.cfg.num_workers == 0 {
            return Err("at least one worker thread is required".to_string());
        }
        if self.cfg.block_len == 0 {
            return Err("block length must be non-zero".to_string());
        }

        let achieved = source.configure(&self.cfg.rx)?;
        log::info!(
            "configured: {:.3} MS/s, {:.3} MHz, {:.1} dB (requested {:.3} MS/s)",
            achieved.sample_rate / 1e6,
            achieved.center_freq / 1e6,
            achieved.gain,
            self.cfg.rx.sample_rate / 1e6,
        );

        let ctx = Arc::new(RunContext::new());
        let queue = Arc::new(BlockQueue::new(ctx.clone()));

        let producer = Producer::new(
            source,
            queue.clone(),
            ctx.clone(),
            self.cfg.block_len,
            self.cfg.drop_threshold,
        );
        let producer_handle = thread::Builder::new()
            .name("rx-producer".to_string())
            .spawn(move || producer.run())
            .map_err(|e| format!("failed to spawn producer: {}", e))?;

        let mut worker_handles = Vec::with_capacity(self.cfg.num_workers);
        for id in 1..=self.cfg.num_workers {
            let worker = Worker::new(id, queue.clone(), sink.clone());
            match thread::Builder::new()
                .name(format!("rx-worker-{}", id))
                .spawn(move || worker.run())
            {
                Ok(handle) => worker_handles.push(handle),
                Err(e) => {
                    // Don't leave the producer and earlier workers
                    // running against an open queue
                    abort_startup(&ctx, &queue, producer_handle, worker_handles);
                    return Err(format!("failed to spawn worker {}: {}", id, e));
                }
            }
        }

        log::info!(
            "running: {} workers, {} samples/block, drop threshold {}, {:.1} s",
            self.cfg.num_workers,
            self.cfg.block_len,
            self.cfg.drop_threshold,
            self.cfg.duration.as_secs_f64(),
        );

        // Wait for the duration, an external cancel, or the producer
        // dying early on a fatal source failure.
        let started = Instant::now();
        let deadline = started + self.cfg.duration;
        let mut last_stats = started;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if self.cancel.load(Ordering::SeqCst) {
                log::info!("stop requested; shutting down early");
                break;
            }
            if producer_handle.is_finished() {
                log::warn!("producer exited early; ending run");
                break;
            }
            if let Some(interval) = self.cfg.stats_interval {
                if now.duration_since(last_stats) >= interval {
                    let snap = ctx.stats.snapshot();
                    log::info!(
                        "[{:.1}s] queue: {} | produced: {} | shed: {} | overflows: {}",
                        started.elapsed().as_secs_f64(),
                        queue.len(),
                        snap.produced,
                        snap.dropped,
                        snap.overflows,
                    );
                    last_stats = now;
                }
            }
            thread::sleep(TICK.min(deadline.saturating_duration_since(now)));
        }

        // Stopping: one-shot signal, then wake everything blocked on
        // the queue. Workers drain whatever is still queued.
        ctx.signal_stop();
        queue.close();

        producer_handle
            .join()
            .map_err(|_| "producer thread panicked".to_string())?;

        let mut worker_blocks = Vec::with_capacity(worker_handles.len());
        for (i, handle) in worker_handles.into_iter().enumerate() {
            let processed = handle
                .join()
                .map_err(|_| format!("worker {} panicked", i + 1))?;
            worker_blocks.push(processed);
        }

        let summary = RunSummary {
            stats: ctx.stats.snapshot(),
            worker_blocks,
            elapsed: started.elapsed(),
            achieved,
        };

        log::info!(
            "terminated after {:.1} s: {} produced, {} shed, {} overflows, max queue {}",
            summary.elapsed.as_secs_f64(),
            summary.stats.produced,
            summary.stats.dropped,
            summary.stats.overflows,
            summary.stats.max_queue_depth,
        );

        Ok(summary)
    }
}

/// Tear down a partially started run: signal stop, wake everything
/// blocked on the queue, and join whatever threads already exist.
fn abort_startup(
    ctx: &RunContext,
    queue: &BlockQueue,
    producer: thread::JoinHandle<()>,
    workers: Vec<thread::JoinHandle<u64>>,
) {
    ctx.signal_stop();
    queue.close();
    let _ = producer.join();
    for worker in workers {
        let _ = worker.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BlockReport;
    use num_complex::Complex32;
    use rx_sdr::ReceiveStatus;
    use std::sync::Mutex;

    struct CollectSink {
        reports: Mutex<Vec<BlockReport>>,
    }

    impl CollectSink {
        fn new() -> Self {
            Self {
                reports: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReportSink for CollectSink {
        fn report(&self, rep: &BlockReport) {
            self.reports.lock().unwrap().push(*rep);
        }
    }

    /// Yields `remaining` full blocks (with a short pacing sleep),
    /// then reports a timeout. `remaining == None` streams forever.
    struct TestSource {
        remaining: Option<usize>,
    }

    impl RxSource for TestSource {
        fn configure(&mut self, cfg: &RxConfig) -> Result<RxConfig, String> {
            Ok(*cfg)
        }

        fn start_streaming(&mut self) -> Result<(), String> {
            Ok(())
        }

        fn stop_streaming(&mut self) {}

        fn receive(&mut self, buf: &mut [Complex32], _timeout_secs: f64) -> ReceiveStatus {
            if let Some(ref mut n) = self.remaining {
                if *n == 0 {
                    return ReceiveStatus::Timeout;
                }
                *n -= 1;
            }
            thread::sleep(Duration::from_millis(1));
            for s in buf.iter_mut() {
                *s = Complex32::new(3.0, 4.0);
            }
            ReceiveStatus::Samples(buf.len())
        }
    }

    fn config(workers: usize) -> RunConfig {
        RunConfig {
            rx: RxConfig {
                sample_rate: 1e6,
                center_freq: 2.437e9,
                gain: 30.0,
            },
            block_len: 32,
            num_workers: workers,
            duration: Duration::from_secs(30),
            drop_threshold: 1000,
            stats_interval: None,
        }
    }

    #[test]
    fn test_run_ends_early_when_source_dies() {
        let controller = Controller::new(config(4));
        let sink = Arc::new(CollectSink::new());
        let summary = controller
            .run(Box::new(TestSource { remaining: Some(200) }), sink.clone())
            .unwrap();

        // Source died after 200 blocks; the 30 s duration was not used up
        assert!(summary.elapsed < Duration::from_secs(10));
        assert_eq!(summary.stats.produced, 200);
        assert_eq!(summary.stats.dropped, 0);

        // Every produced block was consumed exactly once across workers
        let total: u64 = summary.worker_blocks.iter().sum();
        assert_eq!(total, 200);

        let mut seqs: Vec<u64> = sink.reports.lock().unwrap().iter().map(|r| r.seq).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_handle_stops_the_run() {
        let controller = Controller::new(config(2));
        let cancel = controller.cancel_handle();
        let sink = Arc::new(CollectSink::new());

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            cancel.cancel();
        });

        let summary = controller
            .run(Box::new(TestSource { remaining: None }), sink)
            .unwrap();
        stopper.join().unwrap();

        assert!(summary.elapsed < Duration::from_secs(10));
        // Nothing produced went missing
        let total: u64 = summary.worker_blocks.iter().sum();
        assert_eq!(total, summary.stats.produced);
    }

    #[test]
    fn test_abort_startup_stops_and_joins_running_threads() {
        let ctx = Arc::new(RunContext::new());
        let queue = Arc::new(BlockQueue::new(ctx.clone()));
        let sink: Arc<dyn ReportSink> = Arc::new(CollectSink::new());

        let producer = Producer::new(
            Box::new(TestSource { remaining: None }),
            queue.clone(),
            ctx.clone(),
            32,
            1000,
        );
        let producer_handle = thread::spawn(move || producer.run());
        let worker = Worker::new(1, queue.clone(), sink);
        let worker_handle = thread::spawn(move || worker.run());

        // Returns only once both threads have been joined
        abort_startup(&ctx, &queue, producer_handle, vec![worker_handle]);

        assert!(ctx.stop_requested());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_zero_workers_rejected_before_any_thread_starts() {
        let controller = Controller::new(config(0));
        let sink = Arc::new(CollectSink::new());
        let res = controller.run(Box::new(TestSource { remaining: Some(1) }), sink);
        assert!(res.is_err());
    }
}
