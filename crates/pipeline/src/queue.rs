use std::sync::{Arc, Mutex};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::block::SampleBlock;
use crate::context::RunContext;

/// Thread-safe FIFO between the producer and the worker pool.
///
/// Push never blocks and never rejects on capacity; bounding happens at
/// the producer through its drop policy, not here. Pop blocks until a
/// block arrives or the queue is closed. The channel disconnect is the
/// wake-all: after `close()`, blocked workers drain whatever is still
/// queued and then see `None`, so every enqueued block is consumed
/// exactly once even when it arrived concurrently with shutdown.
pub struct BlockQueue {
    tx: Mutex<Option<Sender<SampleBlock>>>,
    rx: Receiver<SampleBlock>,
    ctx: Arc<RunContext>,
}

impl BlockQueue {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
            ctx,
        }
    }

    /// Append a block. Records the post-push depth into the high-water
    /// metric. Returns false only if the queue has been closed.
    pub fn push(&self, block: SampleBlock) -> bool {
        let guard = self.tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => {
                // Cannot fail: we hold the receiver for the queue's lifetime
                let _ = tx.send(block);
                self.ctx.stats.record_queue_depth(self.rx.len());
                true
            }
            None => false,
        }
    }

    /// Remove and return the globally oldest block, blocking while the
    /// queue is empty and still open. Returns `None` once the queue is
    /// closed and fully drained.
    pub fn pop(&self) -> Option<SampleBlock> {
        self.rx.recv().ok()
    }

    /// Advisory depth snapshot; not linearizable with concurrent
    /// pushes and pops.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the queue and wake every thread blocked in `pop`, even if
    /// the queue stays empty. Idempotent.
    pub fn close(&self) {
        self.tx.lock().unwrap().take();
    }
}
