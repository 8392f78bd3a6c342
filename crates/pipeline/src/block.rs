use std::time::Instant;

use num_complex::Complex32;

/// One fixed-length block of complex samples, numbered in production
/// order. Immutable once filled; only full blocks enter the queue.
pub struct SampleBlock {
    /// Producer-assigned sequence number, starting at 0
    pub seq: u64,
    /// Exactly `block_len` samples for every block in a run
    pub samples: Vec<Complex32>,
    /// When the block was received from the source
    pub captured_at: Instant,
}

impl SampleBlock {
    pub fn new(seq: u64, samples: Vec<Complex32>) -> Self {
        Self {
            seq,
            samples,
            captured_at: Instant::now(),
        }
    }

    /// Average signal power: (1/N) * sum(|x[n]|^2), with |I+jQ|^2 = I^2 + Q^2.
    ///
    /// Pure function of the block contents. Accumulates in f64 so long
    /// blocks don't lose precision.
    pub fn avg_power(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|s| s.norm_sqr() as f64)
            .sum();
        sum / self.samples.len() as f64
    }
}
