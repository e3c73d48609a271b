//! perfcollectord - Host performance metrics collector daemon.
//!
//! Samples `/proc` on a fixed interval and writes one JSON snapshot per
//! line to stdout. Logs go to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use perfcollector::collector::{
    Collector, CollectorConfig, DEFAULT_PROC_PATH, ProcfsReader, RealFs,
};
use perfcollector::fmt::{format_bytes, format_bytes_rate, format_ms, format_rate};
use perfcollector::storage::model::{MetricsBlock, Snapshot, SourceKind};
use perfcollector::util::{parse_duration, resolve_host};

/// Host performance metrics collector daemon.
#[derive(Parser, Debug)]
#[command(
    name = "perfcollectord",
    about = "Host performance metrics collector daemon",
    version
)]
struct Args {
    /// Sampling interval (e.g. "10s", "500ms", "1m"; plain numbers are seconds).
    #[arg(short, long, env = "PERFCOLLECTOR_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    interval: Duration,

    /// Per-tick deadline in milliseconds. Sources that do not report in time
    /// are marked as timed out in the snapshot.
    #[arg(long, env = "PERFCOLLECTOR_TIMEOUT_MS", default_value = "2000")]
    timeout_ms: u64,

    /// Path to /proc filesystem (for containers mounting the host's /proc elsewhere).
    #[arg(long, env = "PERFCOLLECTOR_PROC_PATH", default_value = DEFAULT_PROC_PATH)]
    proc_path: String,

    /// Host identity. Defaults to the kernel hostname.
    #[arg(long, env = "PERFCOLLECTOR_HOST")]
    host: Option<String>,

    /// Comma-separated list of sources to collect.
    #[arg(
        long,
        env = "PERFCOLLECTOR_SOURCES",
        value_delimiter = ',',
        default_value = "cpu,memory,network,disk"
    )]
    sources: Vec<SourceKind>,

    /// Forget interfaces and devices not seen for this long (e.g. "1h").
    /// By default they are kept for the lifetime of the process.
    #[arg(long, env = "PERFCOLLECTOR_ENTRY_TTL", value_parser = parse_duration)]
    entry_ttl: Option<Duration>,

    /// Exit after this many snapshots.
    #[arg(short = 'n', long)]
    count: Option<u64>,

    /// Pretty-print JSON (one snapshot spans several lines).
    #[arg(long)]
    pretty: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["perfcollectord", "perfcollector"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Describes the contents of a snapshot for logging.
fn describe_snapshot(snapshot: &Snapshot) -> String {
    let mut parts: Vec<String> = Vec::new();

    for block in &snapshot.blocks {
        match block {
            MetricsBlock::Cpu(cpu) => match cpu.total() {
                Some(total) => parts.push(format!("cpu {:.1}% busy", total.busy)),
                None => parts.push(format!("cpu {} cores warming up", cpu.cores.len())),
            },
            MetricsBlock::Memory(mem) => parts.push(format!(
                "mem {}/{} ({:.1}%)",
                format_bytes(mem.used),
                format_bytes(mem.total),
                mem.used_percent
            )),
            MetricsBlock::Network(net) => {
                let (rx, tx) = net
                    .interfaces
                    .values()
                    .filter_map(|d| d.ready())
                    .fold((0.0, 0.0), |(rx, tx), r| {
                        (
                            rx + r.rx_bytes_per_sec.unwrap_or(0.0),
                            tx + r.tx_bytes_per_sec.unwrap_or(0.0),
                        )
                    });
                parts.push(format!(
                    "{} interfaces rx {} tx {}",
                    net.interfaces.len(),
                    format_bytes_rate(rx),
                    format_bytes_rate(tx)
                ));
            }
            MetricsBlock::Disk(disk) => {
                let iops: f64 = disk
                    .devices
                    .values()
                    .filter_map(|d| d.rates.ready())
                    .map(|r| r.reads_per_sec.unwrap_or(0.0) + r.writes_per_sec.unwrap_or(0.0))
                    .sum();
                parts.push(format!(
                    "{} disks {} iops",
                    disk.devices.len(),
                    format_rate(iops)
                ));
            }
        }
    }

    if !snapshot.errors.is_empty() {
        let failed: Vec<&str> = snapshot.errors.keys().map(SourceKind::as_str).collect();
        parts.push(format!("failed: {}", failed.join("/")));
    }
    if !snapshot.warnings.is_empty() {
        parts.push(format!("{} bad lines", snapshot.warnings.len()));
    }

    parts.join(", ")
}

fn write_snapshot(out: &mut impl Write, snapshot: &Snapshot, pretty: bool) -> io::Result<()> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, snapshot)?;
    } else {
        serde_json::to_writer(&mut *out, snapshot)?;
    }
    writeln!(out)?;
    out.flush()
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    info!("perfcollectord {} starting", env!("CARGO_PKG_VERSION"));

    let fs = RealFs::new();
    let host = args
        .host
        .clone()
        .unwrap_or_else(|| resolve_host(&fs, Path::new(&args.proc_path)));

    let config = CollectorConfig::default()
        .with_host(host)
        .with_sources(args.sources.iter().copied())
        .with_timeout(Duration::from_millis(args.timeout_ms))
        .with_entry_ttl(args.entry_ttl);

    info!(
        "Config: interval={}, timeout={}ms, proc={}, host={}, sources={:?}",
        format_ms(args.interval.as_secs_f64() * 1000.0),
        args.timeout_ms,
        args.proc_path,
        config.host,
        config.sources
    );
    if let Some(ttl) = args.entry_ttl {
        info!("Entry ttl: {}", format_ms(ttl.as_secs_f64() * 1000.0));
    }
    if config.timeout >= args.interval {
        warn!("Tick timeout is not shorter than the interval; ticks may run back to back");
    }

    let reader = ProcfsReader::new(fs, &args.proc_path);
    let mut collector = Collector::new(reader, config);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let stdout = io::stdout();
    let mut snapshot_count: u64 = 0;

    info!("Starting collection loop");

    while running.load(Ordering::SeqCst) {
        let snapshot = collector.collect_once(Utc::now());
        snapshot_count += 1;

        let elapsed = collector
            .last_timing()
            .map(|t| format_ms(t.total.as_secs_f64() * 1000.0))
            .unwrap_or_default();
        info!(
            "Snapshot #{}: {} (in {})",
            snapshot_count,
            describe_snapshot(&snapshot),
            elapsed
        );
        if let Some(timing) = collector.last_timing() {
            for (source, took) in &timing.sources {
                debug!(source = %source, took_ms = took.as_millis() as u64, "source timing");
            }
        }

        if let Err(e) = write_snapshot(&mut stdout.lock(), &snapshot, args.pretty) {
            error!("Failed to write snapshot: {}", e);
            break;
        }

        if args.count.is_some_and(|n| snapshot_count >= n) {
            info!("Collected {} snapshots", snapshot_count);
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = args.interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutdown complete");
}
