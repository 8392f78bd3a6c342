pub mod block;
pub mod context;
pub mod controller;
pub mod producer;
pub mod queue;
pub mod sink;
pub mod stats;
pub mod worker;

pub use block::SampleBlock;
pub use context::RunContext;
pub use controller::{Controller, RunConfig, RunSummary};
pub use queue::BlockQueue;
pub use sink::{BlockReport, ConsoleSink, JsonSink, ReportSink};
pub use stats::{PipelineStats, StatsSnapshot};
