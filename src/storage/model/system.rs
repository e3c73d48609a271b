//! Derived system metrics carried by a snapshot.
//!
//! Everything here is computed from two consecutive raw samples (rates and
//! percentages) or from a single sample (memory gauges). Values that need a
//! previous sample are wrapped in [`Derivation`], so consumers can tell
//! "not computable yet" apart from a genuine zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of deriving a rate set for one (source, identifier) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "metrics", rename_all = "snake_case")]
pub enum Derivation<T> {
    /// First sample for this identifier; no previous sample to diff against.
    WarmingUp,
    /// The clock did not advance since the previous sample.
    Stale,
    /// A counter went backwards; this sample only becomes the new baseline.
    Reset,
    /// Rates computed over the elapsed interval.
    Ready(T),
}

impl<T> Derivation<T> {
    /// Returns the computed metrics, if any.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Derivation::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Derivation::Ready(_))
    }
}

/// CPU time breakdown over one interval, in percent.
///
/// `user` through `steal` partition the interval and sum to 100.
/// `guest` and `guest_nice` are already accounted inside `user` and `nice`
/// by the kernel and are reported for information only.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct CpuUsage {
    pub user: f64,
    pub nice: f64,
    pub system: f64,
    pub idle: f64,
    pub iowait: f64,
    pub irq: f64,
    pub softirq: f64,
    pub steal: f64,
    pub guest: f64,
    pub guest_nice: f64,
    /// Everything except idle and iowait.
    pub busy: f64,
}

impl CpuUsage {
    /// Sum of the states that partition the interval (should be 100 or 0).
    pub fn state_sum(&self) -> f64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }
}

/// Per-second kernel scheduler activity.
///
/// Source: `ctxt` and `processes` lines of `/proc/stat`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct KernelRates {
    /// `None` when the counter is absent or was reset.
    pub context_switches_per_sec: Option<f64>,
    /// Process/thread creations per second.
    pub forks_per_sec: Option<f64>,
}

/// Kernel activity gauges and rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct KernelActivity {
    /// Runnable tasks right now. Source: `procs_running`
    pub procs_running: Option<u64>,
    /// Tasks blocked on I/O right now. Source: `procs_blocked`
    pub procs_blocked: Option<u64>,
    pub rates: Derivation<KernelRates>,
}

/// CPU metrics for one tick.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct CpuMetrics {
    /// Keyed by `total` for the aggregate line and `cpuN` for each core.
    pub cores: BTreeMap<String, Derivation<CpuUsage>>,
    pub kernel: Option<KernelActivity>,
}

impl CpuMetrics {
    /// Aggregate usage across all cores, if derivable this tick.
    pub fn total(&self) -> Option<&CpuUsage> {
        self.cores.get(TOTAL_CPU_KEY).and_then(Derivation::ready)
    }
}

/// Key of the aggregate `cpu` line.
pub const TOTAL_CPU_KEY: &str = "total";

/// Memory usage in bytes.
///
/// Source: `/proc/meminfo`
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct MemoryMetrics {
    /// Source: `MemTotal`
    pub total: u64,
    /// Source: `MemFree`
    pub free: u64,
    /// Source: `MemAvailable`, or free + buffers + cached on kernels without it.
    pub available: u64,
    /// total - available
    pub used: u64,
    /// Source: `Buffers`
    pub buffers: u64,
    /// Source: `Cached`
    pub cached: u64,
    /// Source: `SwapTotal`
    pub swap_total: u64,
    /// Source: `SwapFree`
    pub swap_free: u64,
    /// swap_total - swap_free
    pub swap_used: u64,
    /// used / total * 100, 0 when total is unknown.
    pub used_percent: f64,
}

/// Per-second rates for one network interface.
///
/// Each field is `None` when its counter went backwards this interval.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetRates {
    pub rx_bytes_per_sec: Option<f64>,
    pub rx_packets_per_sec: Option<f64>,
    pub rx_errors_per_sec: Option<f64>,
    pub rx_drops_per_sec: Option<f64>,
    pub tx_bytes_per_sec: Option<f64>,
    pub tx_packets_per_sec: Option<f64>,
    pub tx_errors_per_sec: Option<f64>,
    pub tx_drops_per_sec: Option<f64>,
}

impl NetRates {
    /// Returns true if any counter was reset during the interval.
    pub fn has_reset(&self) -> bool {
        [
            self.rx_bytes_per_sec,
            self.rx_packets_per_sec,
            self.rx_errors_per_sec,
            self.rx_drops_per_sec,
            self.tx_bytes_per_sec,
            self.tx_packets_per_sec,
            self.tx_errors_per_sec,
            self.tx_drops_per_sec,
        ]
        .iter()
        .any(Option::is_none)
    }
}

/// Network metrics for one tick, keyed by interface name.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct NetworkMetrics {
    pub interfaces: BTreeMap<String, Derivation<NetRates>>,
}

/// Per-second rates for one block device.
///
/// Each field is `None` when one of its input counters went backwards.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskRates {
    /// Completed reads per second (read IOPS).
    pub reads_per_sec: Option<f64>,
    /// Completed writes per second (write IOPS).
    pub writes_per_sec: Option<f64>,
    pub read_bytes_per_sec: Option<f64>,
    pub write_bytes_per_sec: Option<f64>,
    pub reads_merged_per_sec: Option<f64>,
    pub writes_merged_per_sec: Option<f64>,
    /// Share of the interval the device had I/O in flight, capped at 100.
    pub utilization_percent: Option<f64>,
    /// Average milliseconds per completed read, 0 when idle.
    pub read_await_ms: Option<f64>,
    /// Average milliseconds per completed write, 0 when idle.
    pub write_await_ms: Option<f64>,
}

/// One block device: instantaneous queue depth plus interval rates.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct DiskActivity {
    /// I/Os currently in progress (a gauge, not a counter).
    pub in_flight: u64,
    pub rates: Derivation<DiskRates>,
}

/// Disk metrics for one tick, keyed by device name.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct DiskMetrics {
    pub devices: BTreeMap<String, DiskActivity>,
}
