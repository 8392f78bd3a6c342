use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

/// One worker's result for one block.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BlockReport {
    pub worker_id: usize,
    pub seq: u64,
    pub avg_power: f64,
    /// Queue depth observed right after the pop
    pub queue_depth: usize,
}

/// Destination for per-block results. Implementations must keep one
/// report's output contiguous even with every worker reporting at once.
pub trait ReportSink: Send + Sync {
    fn report(&self, rep: &BlockReport);
}

/// Plain-text report stream on stdout, one fixed-width line per block.
///
/// A single `println!` holds the stdout lock for the whole line, so
/// reports from different workers never interleave.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn report(&self, rep: &BlockReport) {
        println!(
            "[worker {}] block #{:6} | avg power: {:.8} | queue: {:3}",
            rep.worker_id, rep.seq, rep.avg_power, rep.queue_depth,
        );
    }
}

/// JSON-lines report stream, one object per block.
pub struct JsonSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ReportSink for JsonSink {
    fn report(&self, rep: &BlockReport) {
        let line = match serde_json::to_string(rep) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("report serialization failed: {}", e);
                return;
            }
        };
        let mut out = self.out.lock().unwrap();
        if let Err(e) = writeln!(out, "{}", line) {
            log::warn!("report write failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Writer that appends into a shared buffer.
    struct VecWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for VecWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Writer that fails every write, like a closed pipe.
    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            ))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_sink_survives_write_errors() {
        let sink = JsonSink::new(Box::new(BrokenWriter));
        let rep = BlockReport {
            worker_id: 1,
            seq: 0,
            avg_power: 1.0,
            queue_depth: 0,
        };
        // Failed writes are logged, never panic, and don't poison the sink
        sink.report(&rep);
        sink.report(&rep);
    }

    #[test]
    fn test_json_sink_emits_one_line_per_report() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = JsonSink::new(Box::new(VecWriter(buf.clone())));
        sink.report(&BlockReport {
            worker_id: 1,
            seq: 42,
            avg_power: 25.0,
            queue_depth: 3,
        });
        sink.report(&BlockReport {
            worker_id: 2,
            seq: 43,
            avg_power: 0.0,
            queue_depth: 0,
        });

        let data = buf.lock().unwrap();
        let text = std::str::from_utf8(&data).unwrap();
        let lines: Vec<&str> = text.trim_end().lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["worker_id"], 1);
        assert_eq!(first["seq"], 42);
        assert_eq!(first["avg_power"], 25.0);
    }
}
