//! Rate and percentage derivation from two consecutive counter samples.
//!
//! Every function here is pure: it takes the current record plus the
//! previous one (as returned by [`SampleStore::get_previous`]) and yields a
//! [`Derivation`]. Updating the store is the caller's job.
//!
//! [`SampleStore::get_previous`]: crate::storage::SampleStore::get_previous

use chrono::{DateTime, Utc};

use crate::collector::procfs::{CpuTimes, DiskStats, KernelCounters, MemInfo, NetDevStats};
use crate::storage::model::{
    CpuUsage, Derivation, DiskRates, KernelActivity, KernelRates, MemoryMetrics, NetRates,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// `/proc/diskstats` always counts 512-byte sectors, whatever the device's
/// physical sector size.
pub const SECTOR_SIZE: u64 = 512;

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute u64 delta, returning `None` on counter regression (reset).
pub fn delta(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Seconds between two samples; `None` unless the clock moved forward.
pub fn elapsed_secs(prev: DateTime<Utc>, curr: DateTime<Utc>) -> Option<f64> {
    let secs = (curr - prev).to_std().ok()?.as_secs_f64();
    (secs > 0.0).then_some(secs)
}

/// Per-second rate of a monotonic counter, `None` on regression.
pub fn rate(curr: u64, prev: u64, secs: f64) -> Option<f64> {
    delta(curr, prev).map(|d| d as f64 / secs)
}

/// Shared state machine: no previous → warming up, no elapsed time → stale,
/// `compute` gives up → reset.
fn derive<T, R>(
    prev: Option<(&T, DateTime<Utc>)>,
    now: DateTime<Utc>,
    compute: impl FnOnce(&T, f64) -> Option<R>,
) -> Derivation<R> {
    let Some((prev, prev_ts)) = prev else {
        return Derivation::WarmingUp;
    };
    let Some(secs) = elapsed_secs(prev_ts, now) else {
        return Derivation::Stale;
    };
    match compute(prev, secs) {
        Some(r) => Derivation::Ready(r),
        None => Derivation::Reset,
    }
}

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

/// CPU time breakdown between two `/proc/stat` samples of one core.
///
/// Percentages are shares of the summed non-guest deltas, so they do not
/// depend on the elapsed wall time. Any counter going backwards makes the
/// whole interval a [`Derivation::Reset`].
pub fn derive_cpu(
    curr: &CpuTimes,
    prev: Option<(&CpuTimes, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> Derivation<CpuUsage> {
    derive(prev, now, |prev, _secs| {
        let curr_cols = curr.columns();
        let prev_cols = prev.columns();
        let mut deltas = [0u64; 10];
        for (idx, slot) in deltas.iter_mut().enumerate() {
            *slot = delta(curr_cols[idx], prev_cols[idx])?;
        }

        // user..steal partition the interval; guest is already inside user.
        let total: u64 = deltas[..8].iter().sum();
        let pct = |d: u64| {
            if total == 0 {
                0.0
            } else {
                d as f64 * 100.0 / total as f64
            }
        };

        let usage = CpuUsage {
            user: pct(deltas[0]),
            nice: pct(deltas[1]),
            system: pct(deltas[2]),
            idle: pct(deltas[3]),
            iowait: pct(deltas[4]),
            irq: pct(deltas[5]),
            softirq: pct(deltas[6]),
            steal: pct(deltas[7]),
            guest: pct(deltas[8]),
            guest_nice: pct(deltas[9]),
            busy: if total == 0 {
                0.0
            } else {
                pct(total - deltas[3] - deltas[4])
            },
        };
        Some(usage)
    })
}

/// Context switch and fork rates plus the instantaneous run queue.
pub fn derive_kernel(
    curr: &KernelCounters,
    prev: Option<(&KernelCounters, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> KernelActivity {
    let field_rate = |c: Option<u64>, p: Option<u64>, secs: f64| match (c, p) {
        (Some(c), Some(p)) => rate(c, p, secs),
        _ => None,
    };

    KernelActivity {
        procs_running: curr.procs_running,
        procs_blocked: curr.procs_blocked,
        rates: derive(prev, now, |prev, secs| {
            Some(KernelRates {
                context_switches_per_sec: field_rate(curr.ctxt, prev.ctxt, secs),
                forks_per_sec: field_rate(curr.processes, prev.processes, secs),
            })
        }),
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Memory gauges from a single `/proc/meminfo` sample.
///
/// Kernels older than 3.14 have no `MemAvailable`; free + buffers + cached
/// is used instead.
pub fn memory_metrics(info: &MemInfo) -> MemoryMetrics {
    let get = |key: &str| info.get(key).unwrap_or(0);
    let total = get("MemTotal");
    let free = get("MemFree");
    let buffers = get("Buffers");
    let cached = get("Cached");
    let available = info
        .get("MemAvailable")
        .unwrap_or_else(|| free.saturating_add(buffers).saturating_add(cached));
    let used = total.saturating_sub(available);
    let swap_total = get("SwapTotal");
    let swap_free = get("SwapFree");

    MemoryMetrics {
        total,
        free,
        available,
        used,
        buffers,
        cached,
        swap_total,
        swap_free,
        swap_used: swap_total.saturating_sub(swap_free),
        used_percent: if total == 0 {
            0.0
        } else {
            used as f64 * 100.0 / total as f64
        },
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Per-second rates for one interface. A counter that went backwards
/// yields `None` for that field only.
pub fn derive_net(
    curr: &NetDevStats,
    prev: Option<(&NetDevStats, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> Derivation<NetRates> {
    derive(prev, now, |prev, secs| {
        Some(NetRates {
            rx_bytes_per_sec: rate(curr.rx_bytes, prev.rx_bytes, secs),
            rx_packets_per_sec: rate(curr.rx_packets, prev.rx_packets, secs),
            rx_errors_per_sec: rate(curr.rx_errs, prev.rx_errs, secs),
            rx_drops_per_sec: rate(curr.rx_drop, prev.rx_drop, secs),
            tx_bytes_per_sec: rate(curr.tx_bytes, prev.tx_bytes, secs),
            tx_packets_per_sec: rate(curr.tx_packets, prev.tx_packets, secs),
            tx_errors_per_sec: rate(curr.tx_errs, prev.tx_errs, secs),
            tx_drops_per_sec: rate(curr.tx_drop, prev.tx_drop, secs),
        })
    })
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

/// Average service time: time delta over completed-ops delta, 0 when idle.
fn await_ms(time_curr: u64, time_prev: u64, ops_curr: u64, ops_prev: u64) -> Option<f64> {
    let ops = delta(ops_curr, ops_prev)?;
    let time = delta(time_curr, time_prev)?;
    Some(if ops == 0 {
        0.0
    } else {
        time as f64 / ops as f64
    })
}

/// IOPS, throughput, utilization and await for one block device.
pub fn derive_disk(
    curr: &DiskStats,
    prev: Option<(&DiskStats, DateTime<Utc>)>,
    now: DateTime<Utc>,
) -> Derivation<DiskRates> {
    derive(prev, now, |prev, secs| {
        let bytes_rate = |c: u64, p: u64| {
            delta(c, p).map(|d| d.saturating_mul(SECTOR_SIZE) as f64 / secs)
        };
        let utilization = delta(curr.io_time, prev.io_time)
            .map(|busy_ms| (busy_ms as f64 / (secs * 1000.0) * 100.0).min(100.0));

        Some(DiskRates {
            reads_per_sec: rate(curr.reads, prev.reads, secs),
            writes_per_sec: rate(curr.writes, prev.writes, secs),
            read_bytes_per_sec: bytes_rate(curr.read_sectors, prev.read_sectors),
            write_bytes_per_sec: bytes_rate(curr.write_sectors, prev.write_sectors),
            reads_merged_per_sec: rate(curr.r_merged, prev.r_merged, secs),
            writes_merged_per_sec: rate(curr.w_merged, prev.w_merged, secs),
            utilization_percent: utilization,
            read_await_ms: await_ms(curr.read_time, prev.read_time, curr.reads, prev.reads),
            write_await_ms: await_ms(curr.write_time, prev.write_time, curr.writes, prev.writes),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::procfs::{parse_cpu_stat, parse_diskstats, parse_meminfo};
    use chrono::TimeZone;

    const EPS: f64 = 0.01;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn total_cpu(line: &str) -> CpuTimes {
        parse_cpu_stat(line).unwrap().records.cores["total"]
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn delta_helpers() {
        assert_eq!(delta(10, 4), Some(6));
        assert_eq!(delta(4, 10), None);
        assert_eq!(elapsed_secs(ts(0), ts(2)), Some(2.0));
        assert_eq!(elapsed_secs(ts(2), ts(2)), None);
        assert_eq!(elapsed_secs(ts(3), ts(2)), None);
        assert_eq!(rate(300, 100, 2.0), Some(100.0));
    }

    #[test]
    fn cpu_breakdown_from_two_samples() {
        let prev = total_cpu("cpu  74608 2520 24433 1117073 6176 4054 0 0 0 0");
        let curr = total_cpu("cpu  74708 2540 24533 1118073 6176 4054 0 0 0 0");

        let usage = derive_cpu(&curr, Some((&prev, ts(0))), ts(1));
        let usage = usage.ready().unwrap();

        // deltas: user 100, nice 20, system 100, idle 1000 -> total 1220
        assert_close(usage.user, 8.20);
        assert_close(usage.nice, 1.64);
        assert_close(usage.system, 8.20);
        assert_close(usage.idle, 81.97);
        assert_close(usage.iowait, 0.0);
        assert_close(usage.busy, 18.03);
        assert_close(usage.state_sum(), 100.0);
    }

    #[test]
    fn cpu_percentages_sum_to_hundred() {
        let prev = total_cpu("cpu  100 7 50 900 13 3 2 1 40 5");
        let curr = total_cpu("cpu  377 19 171 1733 29 11 9 4 97 8");

        let usage = derive_cpu(&curr, Some((&prev, ts(0))), ts(3));
        let usage = usage.ready().unwrap();
        assert_close(usage.state_sum(), 100.0);
        assert_close(usage.busy + usage.idle + usage.iowait, 100.0);
    }

    #[test]
    fn cpu_without_previous_is_warming_up() {
        let curr = total_cpu("cpu  1 2 3 4");
        assert_eq!(derive_cpu(&curr, None, ts(0)), Derivation::WarmingUp);
    }

    #[test]
    fn cpu_counter_decrease_is_reset() {
        let prev = total_cpu("cpu  500 0 100 1000");
        let curr = total_cpu("cpu  400 0 150 1100");
        assert_eq!(
            derive_cpu(&curr, Some((&prev, ts(0))), ts(1)),
            Derivation::Reset
        );
    }

    #[test]
    fn cpu_identical_samples_are_zero_or_stale() {
        let sample = total_cpu("cpu  74608 2520 24433 1117073 6176 4054 0 0 0 0");

        let usage = derive_cpu(&sample, Some((&sample, ts(0))), ts(1));
        let usage = usage.ready().unwrap();
        assert_eq!(usage.state_sum(), 0.0);
        assert_eq!(usage.busy, 0.0);

        assert_eq!(
            derive_cpu(&sample, Some((&sample, ts(0))), ts(0)),
            Derivation::Stale
        );
    }

    #[test]
    fn kernel_rates() {
        let prev = KernelCounters {
            ctxt: Some(1000),
            processes: Some(50),
            procs_running: Some(1),
            procs_blocked: Some(0),
        };
        let curr = KernelCounters {
            ctxt: Some(3000),
            processes: Some(40),
            procs_running: Some(4),
            procs_blocked: Some(1),
        };

        let activity = derive_kernel(&curr, Some((&prev, ts(0))), ts(2));
        assert_eq!(activity.procs_running, Some(4));
        assert_eq!(activity.procs_blocked, Some(1));
        let rates = activity.rates.ready().unwrap();
        assert_eq!(rates.context_switches_per_sec, Some(1000.0));
        assert_eq!(rates.forks_per_sec, None);

        let first = derive_kernel(&curr, None, ts(0));
        assert_eq!(first.rates, Derivation::WarmingUp);
        assert_eq!(first.procs_running, Some(4));
    }

    #[test]
    fn memory_from_meminfo() {
        let info = parse_meminfo(
            "MemTotal: 1000 kB\nMemFree: 200 kB\nMemAvailable: 600 kB\nSwapTotal: 100 kB\nSwapFree: 40 kB\n",
        )
        .unwrap()
        .records;

        let mem = memory_metrics(&info);
        assert_eq!(mem.total, 1000 * 1024);
        assert_eq!(mem.available, 600 * 1024);
        assert_eq!(mem.used, 400 * 1024);
        assert_eq!(mem.swap_used, 60 * 1024);
        assert_close(mem.used_percent, 40.0);
    }

    #[test]
    fn memory_without_mem_available() {
        let info = parse_meminfo("MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\n")
            .unwrap()
            .records;

        let mem = memory_metrics(&info);
        assert_eq!(mem.available, 400 * 1024);
        assert_eq!(mem.used, 600 * 1024);
        assert_eq!(mem.swap_total, 0);
    }

    #[test]
    fn memory_without_total() {
        let info = parse_meminfo("MemFree: 100 kB\n").unwrap().records;
        let mem = memory_metrics(&info);
        assert_eq!(mem.total, 0);
        assert_eq!(mem.used, 0);
        assert_eq!(mem.used_percent, 0.0);
    }

    fn nic(rx_bytes: u64, tx_bytes: u64) -> NetDevStats {
        NetDevStats {
            interface: "eth0".into(),
            rx_bytes,
            tx_bytes,
            rx_packets: 10,
            tx_packets: 10,
            ..Default::default()
        }
    }

    #[test]
    fn net_rates() {
        let rates = derive_net(&nic(5000, 3000), Some((&nic(1000, 1000), ts(0))), ts(4));
        let rates = rates.ready().unwrap();

        assert_eq!(rates.rx_bytes_per_sec, Some(1000.0));
        assert_eq!(rates.tx_bytes_per_sec, Some(500.0));
        assert_eq!(rates.rx_packets_per_sec, Some(0.0));
        assert!(!rates.has_reset());
    }

    #[test]
    fn net_counter_wrap_is_per_field() {
        let rates = derive_net(&nic(100, 3000), Some((&nic(1000, 1000), ts(0))), ts(1));
        let rates = rates.ready().unwrap();

        assert_eq!(rates.rx_bytes_per_sec, None);
        assert_eq!(rates.tx_bytes_per_sec, Some(2000.0));
        assert!(rates.has_reset());
    }

    fn sda(line_counters: &str) -> DiskStats {
        parse_diskstats(&format!("8 0 sda {}", line_counters))
            .unwrap()
            .records
            .remove(0)
    }

    #[test]
    fn disk_reads_per_second() {
        let prev = sda("446216 41879 28850928 367620 2510396 1629085 40751896 2828772 0 3386304 3196420");
        let curr = sda("446316 41879 28851128 367720 2510396 1629085 40751896 2828772 0 3386554 3196420");

        let rates = derive_disk(&curr, Some((&prev, ts(0))), ts(1));
        let rates = rates.ready().unwrap();

        assert_eq!(rates.reads_per_sec, Some(100.0));
        assert_eq!(rates.writes_per_sec, Some(0.0));
        assert_eq!(rates.read_bytes_per_sec, Some(200.0 * 512.0));
        assert_eq!(rates.read_await_ms, Some(1.0));
        assert_eq!(rates.write_await_ms, Some(0.0));
        assert_close(rates.utilization_percent.unwrap(), 25.0);
    }

    #[test]
    fn disk_utilization_is_capped() {
        let prev = sda("0 0 0 0 0 0 0 0 0 1000 0");
        let curr = sda("0 0 0 0 0 0 0 0 4 2500 0");

        let rates = derive_disk(&curr, Some((&prev, ts(0))), ts(1));
        assert_eq!(rates.ready().unwrap().utilization_percent, Some(100.0));
    }

    #[test]
    fn disk_counter_reset_yields_none() {
        let prev = sda("1000 0 800 50 0 0 0 0 0 10 0");
        let curr = sda("10 0 8 1 0 0 0 0 0 20 0");

        let rates = derive_disk(&curr, Some((&prev, ts(0))), ts(1));
        let rates = rates.ready().unwrap();
        assert_eq!(rates.reads_per_sec, None);
        assert_eq!(rates.read_bytes_per_sec, None);
        assert_eq!(rates.read_await_ms, None);
        assert_eq!(rates.utilization_percent, Some(1.0));
    }
}
