//! Human-readable formatting helpers for log lines.

/// Format byte count as human-readable size: `"1.5G"`, `"100.3M"`, `"50.0K"`, `"512B"`.
pub fn format_bytes(bytes: u64) -> String {
    let f = bytes as f64;
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1}G", f / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1}M", f / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1}K", f / 1024.0)
    } else {
        format!("{}B", bytes)
    }
}

/// Format bytes-per-second rate: `"1.5G/s"`, `"100.3M/s"`, `"0"` below 1 B/s.
pub fn format_bytes_rate(rate: f64) -> String {
    if rate < 1.0 {
        return "0".to_string();
    }
    if rate >= 1024.0 * 1024.0 * 1024.0 {
        format!("{:.1}G/s", rate / (1024.0 * 1024.0 * 1024.0))
    } else if rate >= 1024.0 * 1024.0 {
        format!("{:.1}M/s", rate / (1024.0 * 1024.0))
    } else if rate >= 1024.0 {
        format!("{:.1}K/s", rate / 1024.0)
    } else {
        format!("{:.0}B/s", rate)
    }
}

/// Format ops-per-second rate: `"12/s"`, `"3.4K/s"`, `"0"` below 0.01/s.
pub fn format_rate(rate: f64) -> String {
    if rate < 0.01 {
        return "0".to_string();
    }
    if rate >= 1_000_000.0 {
        format!("{:.1}M/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.1}K/s", rate / 1_000.0)
    } else if rate >= 10.0 {
        format!("{:.0}/s", rate)
    } else {
        format!("{:.1}/s", rate)
    }
}

/// Format milliseconds: `"1.5s"`, `"12ms"`, `"0.5ms"`.
pub fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{:.0}ms", ms)
    } else {
        format!("{:.1}ms", ms)
    }
}
