//! Parsers for `/proc` filesystem files.
//!
//! These are pure functions that parse the content of various `/proc` files
//! into structured data. They are designed to be easily testable with string inputs.
//!
//! A malformed line never aborts a parse: it is recorded as a [`LineError`]
//! and the remaining lines are still processed. A parser only fails with
//! [`ParseError`] when not a single valid record could be extracted.

use std::collections::BTreeMap;

use crate::storage::model::{LineError, SourceError, SourceKind, TOTAL_CPU_KEY};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub source: SourceKind,
    pub message: String,
    /// Line-level problems seen before giving up.
    pub line_errors: Vec<LineError>,
}

impl ParseError {
    pub fn new(source: SourceKind, msg: impl Into<String>, line_errors: Vec<LineError>) -> Self {
        Self {
            source,
            message: msg.into(),
            line_errors,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error in {}: {}", self.source, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for SourceError {
    fn from(e: ParseError) -> Self {
        SourceError::Parse {
            message: e.message,
            line_errors: e.line_errors.len(),
        }
    }
}

/// Records extracted from one source, plus the lines that had to be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub records: T,
    pub line_errors: Vec<LineError>,
}

fn finish<T>(
    source: SourceKind,
    records: T,
    count: usize,
    line_errors: Vec<LineError>,
) -> Result<Parsed<T>, ParseError> {
    if count == 0 {
        return Err(ParseError::new(source, "no valid records", line_errors));
    }
    Ok(Parsed {
        records,
        line_errors,
    })
}

/// Parses every token as an unsigned counter, naming the first bad one.
fn parse_counters(tokens: &[&str]) -> Result<Vec<u64>, String> {
    tokens
        .iter()
        .enumerate()
        .map(|(idx, tok)| {
            tok.parse::<u64>()
                .map_err(|_| format!("invalid counter {:?} in column {}", tok, idx + 1))
        })
        .collect()
}

// ============ CPU Stat Parser ============

/// Cumulative CPU time counters for one line of `/proc/stat` (jiffies).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

/// Columns of a `cpu` line, in kernel order.
pub const CPU_FIELDS: [&str; 10] = [
    "user",
    "nice",
    "system",
    "idle",
    "iowait",
    "irq",
    "softirq",
    "steal",
    "guest",
    "guest_nice",
];

/// Kernels before 2.6 only expose user, nice, system and idle.
const MIN_CPU_FIELDS: usize = 4;

impl CpuTimes {
    /// Builds counters from positional columns; missing trailing columns are 0.
    pub fn from_columns(cols: &[u64]) -> Self {
        let get = |idx: usize| cols.get(idx).copied().unwrap_or(0);
        Self {
            user: get(0),
            nice: get(1),
            system: get(2),
            idle: get(3),
            iowait: get(4),
            irq: get(5),
            softirq: get(6),
            steal: get(7),
            guest: get(8),
            guest_nice: get(9),
        }
    }

    /// Counters in the order of [`CPU_FIELDS`].
    pub fn columns(&self) -> [u64; 10] {
        [
            self.user,
            self.nice,
            self.system,
            self.idle,
            self.iowait,
            self.irq,
            self.softirq,
            self.steal,
            self.guest,
            self.guest_nice,
        ]
    }
}

/// Scheduler counters from `/proc/stat` that are not per-CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelCounters {
    /// Total context switches since boot.
    pub ctxt: Option<u64>,
    /// Forks since boot.
    pub processes: Option<u64>,
    /// Gauge.
    pub procs_running: Option<u64>,
    /// Gauge.
    pub procs_blocked: Option<u64>,
}

impl KernelCounters {
    pub fn is_empty(&self) -> bool {
        self.ctxt.is_none()
            && self.processes.is_none()
            && self.procs_running.is_none()
            && self.procs_blocked.is_none()
    }
}

/// Parsed `/proc/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatRecord {
    /// Keyed by [`TOTAL_CPU_KEY`] for the aggregate line and `cpuN` per core.
    pub cores: BTreeMap<String, CpuTimes>,
    pub kernel: KernelCounters,
}

/// Maps a `/proc/stat` label to a core key; `None` if it is not a cpu line.
fn cpu_key(label: &str) -> Option<String> {
    let suffix = label.strip_prefix("cpu")?;
    if suffix.is_empty() {
        return Some(TOTAL_CPU_KEY.to_string());
    }
    suffix.parse::<u32>().ok().map(|id| format!("cpu{}", id))
}

/// Parses `/proc/stat` content.
///
/// Format:
/// ```text
/// cpu  74608 2520 24433 1117073 6176 4054 0 0 0 0
/// cpu0 37205 1260 12260 558501 3088 2027 0 0 0 0
/// ctxt 12284608
/// processes 15180
/// ```
pub fn parse_cpu_stat(content: &str) -> Result<Parsed<StatRecord>, ParseError> {
    const SOURCE: SourceKind = SourceKind::Cpu;
    let mut record = StatRecord::default();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(label) = parts.first() else {
            continue;
        };

        if let Some(key) = cpu_key(label) {
            let values = &parts[1..];
            if values.len() < MIN_CPU_FIELDS {
                errors.push(LineError::new(
                    SOURCE,
                    idx + 1,
                    line,
                    format!(
                        "expected at least {} cpu columns, got {}",
                        MIN_CPU_FIELDS,
                        values.len()
                    ),
                ));
                continue;
            }
            match parse_counters(&values[..values.len().min(CPU_FIELDS.len())]) {
                Ok(cols) => {
                    record.cores.insert(key, CpuTimes::from_columns(&cols));
                }
                Err(reason) => errors.push(LineError::new(SOURCE, idx + 1, line, reason)),
            }
            continue;
        }

        let slot = match *label {
            "ctxt" => &mut record.kernel.ctxt,
            "processes" => &mut record.kernel.processes,
            "procs_running" => &mut record.kernel.procs_running,
            "procs_blocked" => &mut record.kernel.procs_blocked,
            _ => continue,
        };
        match parts.get(1).map(|s| s.parse::<u64>()) {
            Some(Ok(v)) => *slot = Some(v),
            _ => errors.push(LineError::new(
                SOURCE,
                idx + 1,
                line,
                format!("invalid value for {}", label),
            )),
        }
    }

    let count = record.cores.len();
    finish(SOURCE, record, count, errors)
}

// ============ Memory Info Parser ============

/// Parsed `/proc/meminfo`: every key with its value in bytes.
///
/// Unknown keys are kept, so newer kernels do not need parser changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemInfo {
    pub values: BTreeMap<String, u64>,
}

impl MemInfo {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.values.get(key).copied()
    }
}

/// Parses `/proc/meminfo` content.
///
/// Format: `Key:   value [kB]`. Values with a `kB` suffix are converted to
/// bytes; unit-less values (e.g. `HugePages_Total`) are kept as-is.
pub fn parse_meminfo(content: &str) -> Result<Parsed<MemInfo>, ParseError> {
    const SOURCE: SourceKind = SourceKind::Memory;
    let mut info = MemInfo::default();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_meminfo_line(line) {
            Ok((key, value)) => {
                info.values.insert(key.to_string(), value);
            }
            Err(reason) => errors.push(LineError::new(SOURCE, idx + 1, line, reason)),
        }
    }

    let count = info.values.len();
    finish(SOURCE, info, count, errors)
}

fn parse_meminfo_line(line: &str) -> Result<(&str, u64), String> {
    let (key, rest) = line
        .split_once(':')
        .ok_or_else(|| "missing ':' separator".to_string())?;
    let key = key.trim();
    if key.is_empty() {
        return Err("empty key".to_string());
    }

    let mut parts = rest.split_whitespace();
    let raw = parts.next().ok_or_else(|| "missing value".to_string())?;
    let value: u64 = raw
        .parse()
        .map_err(|_| format!("invalid integer {:?}", raw))?;

    let bytes = match parts.next() {
        None => value,
        Some("kB") => value
            .checked_mul(1024)
            .ok_or_else(|| "value overflows u64 bytes".to_string())?,
        Some(unit) => return Err(format!("unknown unit {:?}", unit)),
    };
    Ok((key, bytes))
}

// ============ Network Device Stats Parser ============

/// Parsed data from `/proc/net/dev`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDevStats {
    /// Interface name (eth0, lo, etc.)
    pub interface: String,
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errs: u64,
    pub rx_drop: u64,
    pub rx_fifo: u64,
    pub rx_frame: u64,
    pub rx_compressed: u64,
    pub rx_multicast: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errs: u64,
    pub tx_drop: u64,
    pub tx_fifo: u64,
    pub tx_colls: u64,
    pub tx_carrier: u64,
    pub tx_compressed: u64,
}

/// 8 receive + 8 transmit counters.
pub const NET_DEV_FIELDS: usize = 16;

/// "Inter-|   Receive ..." and " face |bytes ...".
const NET_DEV_HEADER_LINES: usize = 2;

impl NetDevStats {
    fn from_columns(interface: &str, cols: &[u64]) -> Self {
        let get = |idx: usize| cols.get(idx).copied().unwrap_or(0);
        Self {
            interface: interface.to_string(),
            rx_bytes: get(0),
            rx_packets: get(1),
            rx_errs: get(2),
            rx_drop: get(3),
            rx_fifo: get(4),
            rx_frame: get(5),
            rx_compressed: get(6),
            rx_multicast: get(7),
            tx_bytes: get(8),
            tx_packets: get(9),
            tx_errs: get(10),
            tx_drop: get(11),
            tx_fifo: get(12),
            tx_colls: get(13),
            tx_carrier: get(14),
            tx_compressed: get(15),
        }
    }
}

/// Parses `/proc/net/dev` content.
///
/// Format:
/// Inter-|   Receive                                                |  Transmit
///  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
///    lo: 1234567     1234    0    0    0     0          0         0  1234567     1234    0    0    0     0       0          0
///
/// The interface name may be glued to the first counter (`eth0:123`).
pub fn parse_net_dev(content: &str) -> Result<Parsed<Vec<NetDevStats>>, ParseError> {
    const SOURCE: SourceKind = SourceKind::Network;
    let mut devices = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate().skip(NET_DEV_HEADER_LINES) {
        if line.trim().is_empty() {
            continue;
        }

        let Some((name, rest)) = line.split_once(':') else {
            errors.push(LineError::new(
                SOURCE,
                idx + 1,
                line,
                "missing ':' after interface name",
            ));
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            errors.push(LineError::new(SOURCE, idx + 1, line, "empty interface name"));
            continue;
        }

        let values: Vec<&str> = rest.split_whitespace().collect();
        if values.len() != NET_DEV_FIELDS {
            errors.push(LineError::new(
                SOURCE,
                idx + 1,
                line,
                format!(
                    "expected {} counters, got {}",
                    NET_DEV_FIELDS,
                    values.len()
                ),
            ));
            continue;
        }

        match parse_counters(&values) {
            Ok(cols) => devices.push(NetDevStats::from_columns(name, &cols)),
            Err(reason) => errors.push(LineError::new(SOURCE, idx + 1, line, reason)),
        }
    }

    let count = devices.len();
    finish(SOURCE, devices, count, errors)
}

// ============ Disk Stats Parser ============

/// Parsed data from `/proc/diskstats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskStats {
    /// Block device major number.
    pub major: u32,
    /// Block device minor number.
    pub minor: u32,
    /// Device name (sda, nvme0n1, etc.)
    pub device: String,
    /// Number of reads completed
    pub reads: u64,
    /// Number of read requests merged
    pub r_merged: u64,
    /// Number of sectors read
    pub read_sectors: u64,
    /// Time spent reading (ms)
    pub read_time: u64,
    /// Number of writes completed
    pub writes: u64,
    /// Number of write requests merged
    pub w_merged: u64,
    /// Number of sectors written
    pub write_sectors: u64,
    /// Time spent writing (ms)
    pub write_time: u64,
    /// Number of I/Os currently in progress
    pub io_in_progress: u64,
    /// Time spent doing I/Os (ms)
    pub io_time: u64,
    /// Weighted time spent doing I/Os (ms)
    pub io_weighted_time: u64,
    /// Counters after the classic eleven (discard and flush stats on newer kernels).
    pub extra: BTreeMap<String, u64>,
}

/// major, minor, device name.
const DISK_LEADING_FIELDS: usize = 3;

/// Counters present on every kernel since 2.6.
pub const DISK_MIN_COUNTERS: usize = 11;

/// Names of the counters newer kernels append (4.18+ discard, 5.5+ flush).
const DISK_EXTRA_FIELDS: [&str; 6] = [
    "discards_completed",
    "discards_merged",
    "sectors_discarded",
    "time_discarding_ms",
    "flushes_completed",
    "time_flushing_ms",
];

impl DiskStats {
    fn from_columns(major: u32, minor: u32, device: &str, cols: &[u64]) -> Self {
        let get = |idx: usize| cols.get(idx).copied().unwrap_or(0);
        let extra = cols
            .iter()
            .enumerate()
            .skip(DISK_MIN_COUNTERS)
            .map(|(idx, value)| {
                let key = DISK_EXTRA_FIELDS
                    .get(idx - DISK_MIN_COUNTERS)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("extra_{}", idx + 1));
                (key, *value)
            })
            .collect();

        Self {
            major,
            minor,
            device: device.to_string(),
            reads: get(0),
            r_merged: get(1),
            read_sectors: get(2),
            read_time: get(3),
            writes: get(4),
            w_merged: get(5),
            write_sectors: get(6),
            write_time: get(7),
            io_in_progress: get(8),
            io_time: get(9),
            io_weighted_time: get(10),
            extra,
        }
    }
}

/// Parses `/proc/diskstats` content.
///
/// Format: major minor name reads r_merged r_sectors r_time writes w_merged w_sectors w_time io_pending io_time w_io_time [discards ...] [flushes ...]
pub fn parse_diskstats(content: &str) -> Result<Parsed<Vec<DiskStats>>, ParseError> {
    const SOURCE: SourceKind = SourceKind::Disk;
    let mut disks = Vec::new();
    let mut errors = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        if parts.len() < DISK_LEADING_FIELDS + DISK_MIN_COUNTERS {
            errors.push(LineError::new(
                SOURCE,
                idx + 1,
                line,
                format!(
                    "expected at least {} fields, got {}",
                    DISK_LEADING_FIELDS + DISK_MIN_COUNTERS,
                    parts.len()
                ),
            ));
            continue;
        }

        let (Ok(major), Ok(minor)) = (parts[0].parse::<u32>(), parts[1].parse::<u32>()) else {
            errors.push(LineError::new(
                SOURCE,
                idx + 1,
                line,
                "invalid major/minor device number",
            ));
            continue;
        };

        match parse_counters(&parts[DISK_LEADING_FIELDS..]) {
            Ok(cols) => disks.push(DiskStats::from_columns(major, minor, parts[2], &cols)),
            Err(reason) => errors.push(LineError::new(SOURCE, idx + 1, line, reason)),
        }
    }

    let count = disks.len();
    finish(SOURCE, disks, count, errors)
}
