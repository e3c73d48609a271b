//! Main collector that turns raw sources into snapshots.
//!
//! The `Collector` struct drives one tick at a time: fan out the reads,
//! wait for them under a deadline, derive rates against the previous
//! samples, and hand back a [`Snapshot`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use crate::collector::assembler::SnapshotAssembler;
use crate::collector::dispatch::{LateWorkers, SourceData, dispatch};
use crate::collector::procfs::{CpuTimes, DiskStats, KernelCounters, NetDevStats};
use crate::collector::traits::SourceReader;
use crate::rates::{derive_cpu, derive_disk, derive_kernel, derive_net, memory_metrics};
use crate::storage::model::{
    CpuMetrics, Derivation, DiskActivity, DiskMetrics, LineError, MetricsBlock, NetworkMetrics,
    Snapshot, SourceKind,
};
use crate::storage::{KERNEL_ID, SampleStore};

/// Per-tick deadline used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Host identity used when none is configured.
pub const UNKNOWN_HOST: &str = "unknown";

/// Settings consumed by the collector core.
///
/// The sampling interval is not here: the caller decides when to tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Host identity stamped on every snapshot.
    pub host: String,
    /// Enabled sources.
    pub sources: Vec<SourceKind>,
    /// Upper bound on how long a tick waits for its sources.
    pub timeout: Duration,
    /// Previous samples not refreshed within this window are dropped.
    /// `None` keeps them for the lifetime of the collector.
    pub entry_ttl: Option<Duration>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: UNKNOWN_HOST.to_string(),
            sources: SourceKind::ALL.to_vec(),
            timeout: DEFAULT_TIMEOUT,
            entry_ttl: None,
        }
    }
}

impl CollectorConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourceKind>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_entry_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.entry_ttl = ttl;
        self
    }
}

/// Timing information for the last tick.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct CollectorTiming {
    /// Total tick time, dispatch to snapshot.
    pub total: Duration,
    /// Read + parse time per source (the deadline for timed-out ones).
    pub sources: BTreeMap<SourceKind, Duration>,
}

/// Main collector that gathers all enabled sources.
pub struct Collector<R: SourceReader + 'static> {
    reader: Arc<R>,
    config: CollectorConfig,
    store: SampleStore,
    /// Workers from earlier ticks that missed their deadline.
    late: LateWorkers,
    /// Timing information from the last collect_once call.
    last_timing: Option<CollectorTiming>,
    ticks: u64,
}

fn trace_state<T>(source: SourceKind, id: &str, derivation: &Derivation<T>) {
    let state = match derivation {
        Derivation::Ready(_) => return,
        Derivation::WarmingUp => "warming_up",
        Derivation::Stale => "stale",
        Derivation::Reset => "reset",
    };
    trace!(source = %source, id = %id, state, "rates not derived");
}

impl<R: SourceReader + 'static> Collector<R> {
    /// Creates a new collector.
    ///
    /// # Arguments
    /// * `reader` - Raw source input (usually a `ProcfsReader`)
    /// * `config` - Host id, enabled sources, deadline and eviction settings
    pub fn new(reader: R, config: CollectorConfig) -> Self {
        Self {
            reader: Arc::new(reader),
            config,
            store: SampleStore::new(),
            late: LateWorkers::new(),
            last_timing: None,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Previous samples the next tick will be derived against.
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Returns timing information from the last collect_once call.
    pub fn last_timing(&self) -> Option<&CollectorTiming> {
        self.last_timing.as_ref()
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs one tick and returns its snapshot.
    ///
    /// Never fails: every source either contributes a block or an entry in
    /// `Snapshot::errors`. `now` is the timestamp of the snapshot and of
    /// every sample stored during this tick.
    pub fn collect_once(&mut self, now: DateTime<Utc>) -> Snapshot {
        let start = Instant::now();
        let tick = self.ticks + 1;
        trace!(tick, "idle -> dispatching");

        let reports = dispatch(
            &self.reader,
            &self.config.sources,
            self.config.timeout,
            &mut self.late,
        );
        trace!(tick, reported = reports.len(), "awaiting -> merging");

        let mut assembler = SnapshotAssembler::new();
        let mut timing = CollectorTiming::default();

        for (source, report) in reports {
            timing.sources.insert(source, report.elapsed);
            match report.outcome {
                Ok(data) => {
                    let (block, warnings) = self.merge(data, now);
                    if let Some(first) = warnings.first() {
                        warn!(
                            source = %source,
                            bad_lines = warnings.len(),
                            first = %first,
                            "skipped malformed lines"
                        );
                    }
                    assembler.add_block(block);
                    assembler.add_warnings(warnings);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "source failed");
                    assembler.add_error(source, e);
                }
            }
        }

        if let Some(ttl) = self.config.entry_ttl {
            match chrono::Duration::from_std(ttl) {
                Ok(ttl) => match now.checked_sub_signed(ttl) {
                    Some(cutoff) => {
                        let evicted = self.store.evict_older_than(cutoff);
                        if evicted > 0 {
                            debug!(evicted, remaining = self.store.len(), "evicted stale samples");
                        }
                    }
                    None => warn!(
                        ttl_secs = ttl.num_seconds(),
                        "entry ttl reaches past the earliest timestamp, eviction skipped"
                    ),
                },
                Err(e) => warn!(error = %e, "entry ttl out of range, eviction skipped"),
            }
        }

        let snapshot = assembler.assemble(now, self.config.host.clone());
        timing.total = start.elapsed();
        debug!(
            tick,
            blocks = snapshot.blocks.len(),
            errors = snapshot.errors.len(),
            warnings = snapshot.warnings.len(),
            tracked = self.store.len(),
            elapsed_ms = timing.total.as_millis() as u64,
            "tick complete"
        );
        trace!(tick, "merging -> idle");

        self.ticks = tick;
        self.last_timing = Some(timing);
        snapshot
    }

    /// Derives one source's block and refreshes its previous samples.
    fn merge(&mut self, data: SourceData, now: DateTime<Utc>) -> (MetricsBlock, Vec<LineError>) {
        match data {
            SourceData::Cpu(parsed) => {
                let mut cores = BTreeMap::new();
                for (key, times) in parsed.records.cores {
                    let prev = self.store.get_previous::<CpuTimes>(SourceKind::Cpu, &key);
                    let usage = derive_cpu(&times, prev, now);
                    trace_state(SourceKind::Cpu, &key, &usage);
                    self.store.put(SourceKind::Cpu, key.clone(), times, now);
                    cores.insert(key, usage);
                }

                let counters = parsed.records.kernel;
                let kernel = (!counters.is_empty()).then(|| {
                    let prev = self
                        .store
                        .get_previous::<KernelCounters>(SourceKind::Cpu, KERNEL_ID);
                    let activity = derive_kernel(&counters, prev, now);
                    trace_state(SourceKind::Cpu, KERNEL_ID, &activity.rates);
                    self.store.put(SourceKind::Cpu, KERNEL_ID, counters, now);
                    activity
                });

                (
                    MetricsBlock::Cpu(CpuMetrics { cores, kernel }),
                    parsed.line_errors,
                )
            }
            SourceData::Memory(parsed) => (
                MetricsBlock::Memory(memory_metrics(&parsed.records)),
                parsed.line_errors,
            ),
            SourceData::Network(parsed) => {
                let mut interfaces = BTreeMap::new();
                for dev in parsed.records {
                    let name = dev.interface.clone();
                    let prev = self
                        .store
                        .get_previous::<NetDevStats>(SourceKind::Network, &name);
                    let rates = derive_net(&dev, prev, now);
                    trace_state(SourceKind::Network, &name, &rates);
                    self.store.put(SourceKind::Network, name.clone(), dev, now);
                    interfaces.insert(name, rates);
                }
                (
                    MetricsBlock::Network(NetworkMetrics { interfaces }),
                    parsed.line_errors,
                )
            }
            SourceData::Disk(parsed) => {
                let mut devices = BTreeMap::new();
                for disk in parsed.records {
                    let name = disk.device.clone();
                    let prev = self.store.get_previous::<DiskStats>(SourceKind::Disk, &name);
                    let rates = derive_disk(&disk, prev, now);
                    trace_state(SourceKind::Disk, &name, &rates);
                    let in_flight = disk.io_in_progress;
                    self.store.put(SourceKind::Disk, name.clone(), disk, now);
                    devices.insert(name, DiskActivity { in_flight, rates });
                }
                (
                    MetricsBlock::Disk(DiskMetrics { devices }),
                    parsed.line_errors,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::collector::procfs::ProcfsReader;
    use crate::storage::model::SourceError;
    use chrono::TimeZone;
    use std::io;

    const EPS: f64 = 0.01;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn collector(fs: &MockFs) -> Collector<ProcfsReader<MockFs>> {
        Collector::new(
            ProcfsReader::new(fs.clone(), "/proc"),
            CollectorConfig::default()
                .with_host("test-host")
                .with_timeout(Duration::from_secs(5)),
        )
    }

    fn net_dev(lines: &[&str]) -> String {
        let mut content = String::from(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
        );
        for line in lines {
            content.push_str(line);
            content.push('\n');
        }
        content
    }

    #[test]
    fn first_tick_is_warming_up() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        let snapshot = collector.collect_once(ts(0));

        assert_eq!(snapshot.host, "test-host");
        assert_eq!(snapshot.timestamp, ts(0));
        assert!(snapshot.is_complete());
        assert!(snapshot.warnings.is_empty());
        assert_eq!(snapshot.blocks.len(), 4);

        let cpu = snapshot.cpu().unwrap();
        assert_eq!(cpu.cores.len(), 5);
        assert!(cpu.cores.values().all(|d| *d == Derivation::WarmingUp));
        let kernel = cpu.kernel.as_ref().unwrap();
        assert_eq!(kernel.procs_running, Some(2));
        assert_eq!(kernel.rates, Derivation::WarmingUp);

        let mem = snapshot.memory().unwrap();
        assert_eq!(mem.total, 16384000 * 1024);
        assert_eq!(mem.swap_used, 1024000 * 1024);

        let disk = snapshot.disk().unwrap();
        assert_eq!(disk.devices["nvme0n1"].in_flight, 5);
        assert_eq!(disk.devices["sda"].rates, Derivation::WarmingUp);

        assert_eq!(collector.ticks(), 1);
        assert_eq!(collector.store().count_for(SourceKind::Memory), 0);
        assert_eq!(collector.store().count_for(SourceKind::Cpu), 6);
        let timing = collector.last_timing().unwrap();
        assert_eq!(timing.sources.len(), 4);
    }

    #[test]
    fn cpu_percentages_from_consecutive_ticks() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        fs.add_file("/proc/stat", "cpu  74608 2520 24433 1117073 6176 4054 0 0 0 0\n");
        collector.collect_once(ts(0));
        fs.add_file("/proc/stat", "cpu  74708 2540 24533 1118073 6176 4054 0 0 0 0\n");
        let snapshot = collector.collect_once(ts(1));

        let total = snapshot.cpu().unwrap().total().unwrap();
        assert!((total.user - 8.20).abs() < EPS);
        assert!((total.idle - 81.97).abs() < EPS);
        assert!((total.state_sum() - 100.0).abs() < EPS);
        assert!(snapshot.cpu().unwrap().kernel.is_none());
    }

    #[test]
    fn disk_reads_per_second() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        fs.add_file(
            "/proc/diskstats",
            "   8       0 sda 446216 41879 28850928 367620 2510396 1629085 40751896 2828772 0 3386304 3196420\n",
        );
        collector.collect_once(ts(0));
        fs.add_file(
            "/proc/diskstats",
            "   8       0 sda 446316 41879 28850928 367620 2510396 1629085 40751896 2828772 0 3386304 3196420\n",
        );
        let snapshot = collector.collect_once(ts(1));

        let sda = &snapshot.disk().unwrap().devices["sda"];
        assert_eq!(sda.rates.ready().unwrap().reads_per_sec, Some(100.0));
    }

    #[test]
    fn new_interface_warms_up() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        fs.add_file(
            "/proc/net/dev",
            net_dev(&["  eth0: 1000 10 0 0 0 0 0 0 2000 20 0 0 0 0 0 0"]),
        );
        collector.collect_once(ts(0));
        fs.add_file(
            "/proc/net/dev",
            net_dev(&[
                "  eth0: 3000 30 0 0 0 0 0 0 2000 20 0 0 0 0 0 0",
                "  veth1: 500 5 0 0 0 0 0 0 500 5 0 0 0 0 0 0",
            ]),
        );
        let snapshot = collector.collect_once(ts(2));

        let net = snapshot.network().unwrap();
        assert!(snapshot.error(SourceKind::Network).is_none());
        assert_eq!(net.interfaces["veth1"], Derivation::WarmingUp);
        let eth0 = net.interfaces["eth0"].ready().unwrap();
        assert_eq!(eth0.rx_bytes_per_sec, Some(1000.0));
        assert_eq!(eth0.tx_bytes_per_sec, Some(0.0));
    }

    #[test]
    fn vanished_interface_is_not_an_error() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);
        collector.collect_once(ts(0));

        fs.add_file(
            "/proc/net/dev",
            net_dev(&["  eth0: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0"]),
        );
        let snapshot = collector.collect_once(ts(1));

        let net = snapshot.network().unwrap();
        assert!(!net.interfaces.contains_key("lo"));
        assert!(snapshot.is_complete());
        // Retained without a ttl.
        assert_eq!(collector.store().count_for(SourceKind::Network), 2);
    }

    #[test]
    fn same_input_later_is_zero_same_time_is_stale() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        collector.collect_once(ts(0));
        let later = collector.collect_once(ts(1));

        let total = later.cpu().unwrap().total().unwrap();
        assert_eq!(total.state_sum(), 0.0);
        let eth0 = later.network().unwrap().interfaces["eth0"].ready().unwrap();
        assert_eq!(eth0.rx_bytes_per_sec, Some(0.0));
        let sda = later.disk().unwrap().devices["sda"].rates.ready().unwrap();
        assert_eq!(sda.reads_per_sec, Some(0.0));
        assert_eq!(sda.utilization_percent, Some(0.0));

        let repeated = collector.collect_once(ts(1));
        assert_eq!(repeated.cpu().unwrap().cores["total"], Derivation::Stale);
        assert_eq!(repeated.network().unwrap().interfaces["lo"], Derivation::Stale);
    }

    #[test]
    fn counter_reset_then_recovers() {
        let fs = MockFs::typical_system();
        let mut collector = collector(&fs);

        fs.add_file("/proc/stat", "cpu  5000 0 1000 20000\n");
        collector.collect_once(ts(0));
        fs.add_file("/proc/stat", "cpu  10 0 5 100\n");
        let reset = collector.collect_once(ts(1));
        assert_eq!(reset.cpu().unwrap().cores["total"], Derivation::Reset);

        fs.add_file("/proc/stat", "cpu  60 0 5 150\n");
        let recovered = collector.collect_once(ts(2));
        let total = recovered.cpu().unwrap().total().unwrap();
        assert!((total.user - 50.0).abs() < EPS);
        assert!((total.idle - 50.0).abs() < EPS);
    }

    #[test]
    fn failed_source_keeps_other_blocks() {
        let fs = MockFs::typical_system();
        fs.remove_file("/proc/diskstats");
        fs.add_file("/proc/meminfo", "not meminfo at all\n");
        let mut collector = collector(&fs);

        let snapshot = collector.collect_once(ts(0));

        assert!(matches!(
            snapshot.error(SourceKind::Disk),
            Some(SourceError::Read { .. })
        ));
        assert!(matches!(
            snapshot.error(SourceKind::Memory),
            Some(SourceError::Parse { line_errors: 1, .. })
        ));
        assert!(snapshot.disk().is_none());
        assert!(snapshot.cpu().is_some());
        assert!(snapshot.network().is_some());
        assert_eq!(collector.store().count_for(SourceKind::Disk), 0);
    }

    #[test]
    fn malformed_lines_become_warnings() {
        let fs = MockFs::with_malformed_lines();
        let mut collector = collector(&fs);

        let snapshot = collector.collect_once(ts(0));

        assert!(snapshot.is_complete());
        assert_eq!(snapshot.blocks.len(), 4);
        assert_eq!(snapshot.warnings.len(), 4);
        for source in SourceKind::ALL {
            let count = snapshot.warnings.iter().filter(|w| w.source == source).count();
            assert_eq!(count, 1, "{}", source);
        }
        assert_eq!(snapshot.cpu().unwrap().cores.len(), 2);
        assert_eq!(snapshot.network().unwrap().interfaces.len(), 1);
        assert_eq!(snapshot.disk().unwrap().devices.len(), 1);
    }

    #[test]
    fn legacy_kernel_fallbacks() {
        let fs = MockFs::legacy_kernel();
        let mut collector = collector(&fs);

        let snapshot = collector.collect_once(ts(0));

        assert!(snapshot.is_complete());
        let mem = snapshot.memory().unwrap();
        assert_eq!(mem.available, (512000 + 128000 + 256000) * 1024);
        assert!(snapshot.cpu().unwrap().kernel.is_none());
        assert!(snapshot.network().unwrap().interfaces.contains_key("eth0"));
    }

    #[test]
    fn only_enabled_sources_are_collected() {
        let fs = MockFs::typical_system();
        let mut collector = Collector::new(
            ProcfsReader::new(fs, "/proc"),
            CollectorConfig::default().with_sources([SourceKind::Memory, SourceKind::Disk]),
        );

        let snapshot = collector.collect_once(ts(0));

        assert_eq!(snapshot.host, UNKNOWN_HOST);
        let kinds: Vec<SourceKind> = snapshot.blocks.iter().map(MetricsBlock::source).collect();
        assert_eq!(kinds, vec![SourceKind::Memory, SourceKind::Disk]);
    }

    #[test]
    fn ttl_evicts_unrefreshed_samples() {
        let fs = MockFs::typical_system();
        let mut collector = Collector::new(
            ProcfsReader::new(fs.clone(), "/proc"),
            CollectorConfig::default().with_entry_ttl(Some(Duration::from_secs(5))),
        );

        collector.collect_once(ts(0));
        assert_eq!(collector.store().count_for(SourceKind::Network), 2);

        fs.add_file(
            "/proc/net/dev",
            net_dev(&["  eth0: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0"]),
        );
        collector.collect_once(ts(3));
        assert_eq!(collector.store().count_for(SourceKind::Network), 2);

        collector.collect_once(ts(10));
        assert_eq!(collector.store().count_for(SourceKind::Network), 1);
    }

    #[test]
    fn huge_ttl_skips_eviction() {
        let fs = MockFs::typical_system();
        let ttl = crate::util::parse_duration("14000000w").unwrap();
        let mut collector = Collector::new(
            ProcfsReader::new(fs, "/proc"),
            CollectorConfig::default().with_entry_ttl(Some(ttl)),
        );

        collector.collect_once(ts(0));
        let snapshot = collector.collect_once(ts(10));

        assert!(snapshot.is_complete());
        assert!(snapshot.cpu().unwrap().total().is_some());
        assert_eq!(collector.store().count_for(SourceKind::Network), 2);
    }

    struct Stalling {
        inner: ProcfsReader<MockFs>,
        delay: Duration,
    }

    impl SourceReader for Stalling {
        fn read(&self, source: SourceKind) -> io::Result<String> {
            if source == SourceKind::Disk {
                std::thread::sleep(self.delay);
            }
            self.inner.read(source)
        }
    }

    #[test]
    fn stalled_source_times_out_within_deadline() {
        let reader = Stalling {
            inner: ProcfsReader::new(MockFs::typical_system(), "/proc"),
            delay: Duration::from_secs(3),
        };
        let mut collector = Collector::new(
            reader,
            CollectorConfig::default().with_timeout(Duration::from_millis(100)),
        );

        let started = Instant::now();
        let snapshot = collector.collect_once(ts(0));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(
            snapshot.error(SourceKind::Disk),
            Some(&SourceError::Timeout { after_ms: 100 })
        );
        assert_eq!(snapshot.blocks.len(), 3);
        assert!(snapshot.memory().is_some());

        // The stuck disk read is not started a second time.
        let started = Instant::now();
        let next = collector.collect_once(ts(1));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(
            next.error(SourceKind::Disk),
            Some(&SourceError::Timeout { after_ms: 100 })
        );
        assert!(next.cpu().unwrap().total().is_some());
    }

    struct PanicOnCpu(ProcfsReader<MockFs>);

    impl SourceReader for PanicOnCpu {
        fn read(&self, source: SourceKind) -> io::Result<String> {
            if source == SourceKind::Cpu {
                panic!("boom");
            }
            self.0.read(source)
        }
    }

    #[test]
    fn worker_panic_is_reported() {
        let reader = PanicOnCpu(ProcfsReader::new(MockFs::typical_system(), "/proc"));
        let mut collector = Collector::new(reader, CollectorConfig::default());

        let snapshot = collector.collect_once(ts(0));

        assert_eq!(
            snapshot.error(SourceKind::Cpu),
            Some(&SourceError::Panicked {
                message: "boom".into()
            })
        );
        assert_eq!(snapshot.blocks.len(), 3);

        // The collector stays usable after a panic.
        let next = collector.collect_once(ts(1));
        assert!(next.network().unwrap().interfaces["eth0"].is_ready());
    }
}
