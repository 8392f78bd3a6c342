use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use rx_pipeline::{ConsoleSink, Controller, JsonSink, ReportSink, RunConfig, RunSummary};
use rx_sdr::sim::SimSource;
use rx_sdr::{RxConfig, RxSource};

#[derive(Parser, Debug)]
#[command(name = "rx-power")]
#[command(about = "Multi-threaded RX streamer computing per-block average power")]
struct Cli {
    /// Sampling rate in samples per second
    #[arg(default_value_t = 1e6)]
    rate: f64,

    /// Number of processing (worker) threads
    #[arg(default_value_t = 2)]
    workers: usize,

    /// Run duration in seconds
    #[arg(default_value_t = 10.0)]
    duration: f64,

    /// Center frequency in Hz
    #[arg(short = 'c', long, default_value_t = 2.437e9)]
    freq: f64,

    /// RX gain in dB
    #[arg(short, long, default_value_t = 30.0)]
    gain: f64,

    /// Complex samples per block
    #[arg(long, default_value_t = 10_000)]
    block_size: usize,

    /// Queue depth at which the producer starts shedding blocks
    #[arg(long, default_value_t = 100)]
    drop_threshold: usize,

    /// Sample source: sim or usrp
    #[arg(short, long, default_value = "sim")]
    source: String,

    /// UHD device args for the USRP source (e.g. "serial=XXXXXXX")
    #[arg(long, default_value = "")]
    args: String,

    /// Emit reports as JSON lines instead of formatted text
    #[arg(long)]
    json: bool,

    /// Log a periodic queue/counter line during the run
    #[arg(long)]
    stats: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if cli.verbose {
        log::info!("rx-power starting");
        log::info!("sampling rate: {} Sa/s", cli.rate);
        log::info!("workers: {}", cli.workers);
        log::info!("duration: {} s", cli.duration);
    }

    if cli.rate <= 0.0 || !cli.rate.is_finite() {
        eprintln!("invalid sampling rate: {}", cli.rate);
        std::process::exit(1);
    }
    if cli.workers == 0 {
        eprintln!("at least one worker thread is required");
        std::process::exit(1);
    }
    if cli.duration <= 0.0 || !cli.duration.is_finite() {
        eprintln!("invalid run duration: {}", cli.duration);
        std::process::exit(1);
    }
    if cli.block_size == 0 {
        eprintln!("block size must be non-zero");
        std::process::exit(1);
    }

    let source: Box<dyn RxSource> = match cli.source.as_str() {
        "sim" => Box::new(SimSource::new()),
        #[cfg(feature = "usrp")]
        "usrp" => match rx_sdr::usrp::UsrpSource::new(&cli.args) {
            Ok(s) => Box::new(s),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
        #[cfg(not(feature = "usrp"))]
        "usrp" => {
            eprintln!("USRP support not compiled in (rebuild with --features usrp)");
            std::process::exit(1);
        }
        other => {
            eprintln!("unknown source: {} (use sim or usrp)", other);
            std::process::exit(1);
        }
    };

    let sink: Arc<dyn ReportSink> = if cli.json {
        Arc::new(JsonSink::stdout())
    } else {
        Arc::new(ConsoleSink)
    };

    let controller = Controller::new(RunConfig {
        rx: RxConfig {
            sample_rate: cli.rate,
            center_freq: cli.freq,
            gain: cli.gain,
        },
        block_len: cli.block_size,
        num_workers: cli.workers,
        duration: Duration::from_secs_f64(cli.duration),
        drop_threshold: cli.drop_threshold,
        stats_interval: if cli.stats {
            Some(Duration::from_secs(5))
        } else {
            None
        },
    });

    match controller.run(source, sink) {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== run summary ===");
    println!("elapsed:           {:.1} s", summary.elapsed.as_secs_f64());
    println!("blocks produced:   {}", summary.stats.produced);
    println!("blocks shed:       {}", summary.stats.dropped);
    println!("device overflows:  {}", summary.stats.overflows);
    println!("max queue depth:   {}", summary.stats.max_queue_depth);
    for (i, n) in summary.worker_blocks.iter().enumerate() {
        println!("worker {}:          {} blocks", i + 1, n);
    }

    let rate_msps = summary.achieved.sample_rate / 1e6;
    if summary.stats.overflows > 0 || summary.stats.dropped > 0 {
        println!(
            "WARNING: the host could not keep up at {:.3} MS/s (shed or overflowed blocks)",
            rate_msps,
        );
    } else {
        println!("no overflows or shed blocks at {:.3} MS/s", rate_msps);
    }
}
