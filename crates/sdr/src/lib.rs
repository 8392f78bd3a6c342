pub mod sim;

#[cfg(feature = "usrp")]
pub mod usrp;

use num_complex::Complex32;

/// Requested (or achieved) RX tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxConfig {
    /// Sample rate in samples per second
    pub sample_rate: f64,
    /// Center frequency in Hz
    pub center_freq: f64,
    /// RX gain in dB
    pub gain: f64,
}

/// Outcome of one blocking receive call, following the UHD RX metadata
/// error classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveStatus {
    /// `n` complex samples were written to the front of the buffer.
    /// `n` may be less than the buffer length (a partial receive).
    Samples(usize),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The device dropped samples internally before delivering any.
    /// No data was written; the stream itself is still healthy.
    Overflow,
    /// Any other device error.
    Error(String),
}

/// Common trait for all RX sample sources.
///
/// Lifecycle: `configure` once, `start_streaming`, then call `receive`
/// repeatedly from a single thread, and finish with `stop_streaming`.
pub trait RxSource: Send {
    /// Apply the requested tuning and return the values the device
    /// actually achieved.
    fn configure(&mut self, cfg: &RxConfig) -> Result<RxConfig, String>;

    /// Begin continuous streaming.
    fn start_streaming(&mut self) -> Result<(), String>;

    /// Stop continuous streaming. Safe to call more than once.
    fn stop_streaming(&mut self);

    /// Block until up to `buf.len()` samples arrive or `timeout_secs`
    /// elapses, and classify the result.
    fn receive(&mut self, buf: &mut [Complex32], timeout_secs: f64) -> ReceiveStatus;
}
