// Copyright 2026 CEMAXECUTER LLC

use std::thread;
use std::time::Duration;

use num_complex::Complex32;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{ReceiveStatus, RxConfig, RxSource};

/// Above this sample rate the simulated host starts losing blocks.
const DEFAULT_OVERFLOW_RATE: f64 = 15e6;

/// Chance (percent) that a receive reports an overflow when running
/// above the overflow rate.
const OVERFLOW_PCT: u32 = 5;

/// Synthetic sample source for running the pipeline without hardware.
///
/// Generates an amplitude-modulated tone with a small noise floor and
/// paces itself so samples are delivered at the configured rate. When
/// the configured rate exceeds `overflow_rate`, a fraction of receive
/// calls report `Overflow` instead of data, mimicking a host that
/// cannot keep up with the device.
pub struct SimSource {
    cfg: RxConfig,
    overflow_rate: f64,
    streaming: bool,
    block_count: u64,
    rng: SmallRng,
}

impl SimSource {
    pub fn new() -> Self {
        Self {
            cfg: RxConfig {
                sample_rate: 1e6,
                center_freq: 2.437e9,
                gain: 30.0,
            },
            overflow_rate: DEFAULT_OVERFLOW_RATE,
            streaming: false,
            block_count: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Override the rate above which simulated overflows begin.
    pub fn set_overflow_rate(&mut self, rate: f64) {
        self.overflow_rate = rate;
    }
}

impl Default for SimSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RxSource for SimSource {
    fn configure(&mut self, cfg: &RxConfig) -> Result<RxConfig, String> {
        if cfg.sample_rate <= 0.0 {
            return Err(format!("invalid sample rate: {}", cfg.sample_rate));
        }
        self.cfg = *cfg;
        log::info!(
            "sim source configured: {:.3} MS/s, {:.3} MHz, {} dB",
            cfg.sample_rate / 1e6,
            cfg.center_freq / 1e6,
            cfg.gain,
        );
        // The simulator achieves exactly what was asked for.
        Ok(self.cfg)
    }

    fn start_streaming(&mut self) -> Result<(), String> {
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.streaming = false;
    }

    fn receive(&mut self, buf: &mut [Complex32], _timeout_secs: f64) -> ReceiveStatus {
        if !self.streaming {
            return ReceiveStatus::Error("receive called before start_streaming".to_string());
        }

        // Pace delivery to the configured sample rate.
        let block_secs = buf.len() as f64 / self.cfg.sample_rate;
        thread::sleep(Duration::from_secs_f64(block_secs));

        if self.cfg.sample_rate > self.overflow_rate && self.rng.gen_range(0..100) < OVERFLOW_PCT {
            return ReceiveStatus::Overflow;
        }

        self.block_count += 1;
        let amplitude = 0.1 + 0.05 * (self.block_count as f32 * 0.1).sin();
        for (i, sample) in buf.iter_mut().enumerate() {
            let phase = i as f32 * 0.01;
            let noise_i = 0.02 * (self.rng.gen::<f32>() - 0.5);
            let noise_q = 0.02 * (self.rng.gen::<f32>() - 0.5);
            *sample = Complex32::new(
                amplitude * phase.sin() + noise_i,
                amplitude * phase.cos() + noise_q,
            );
        }

        ReceiveStatus::Samples(buf.len())
    }
}
