//! Source kinds and the per-source failure taxonomy.
//!
//! A tick either produces data for a source, or records one [`SourceError`]
//! for it. Malformed lines inside an otherwise readable source are reported
//! separately as [`LineError`]s and never fail the whole source.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category of kernel counters sampled by the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// CPU time breakdown and kernel activity counters.
    /// Source: `/proc/stat`
    Cpu,

    /// Memory usage.
    /// Source: `/proc/meminfo`
    Memory,

    /// Per-interface network counters.
    /// Source: `/proc/net/dev`
    Network,

    /// Per-device block I/O counters.
    /// Source: `/proc/diskstats`
    Disk,
}

impl SourceKind {
    /// All source kinds, in snapshot order.
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Cpu,
        SourceKind::Memory,
        SourceKind::Network,
        SourceKind::Disk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cpu => "cpu",
            SourceKind::Memory => "memory",
            SourceKind::Network => "network",
            SourceKind::Disk => "disk",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(SourceKind::Cpu),
            "memory" | "mem" => Ok(SourceKind::Memory),
            "network" | "net" => Ok(SourceKind::Network),
            "disk" => Ok(SourceKind::Disk),
            other => Err(format!(
                "unknown source '{}' (expected cpu, memory, network or disk)",
                other
            )),
        }
    }
}

/// Why a source produced no data in a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceError {
    /// The raw input could not be read at all.
    Read { message: String },

    /// The input was read but no valid record could be extracted.
    Parse { message: String, line_errors: usize },

    /// The source did not report back before the tick deadline.
    Timeout { after_ms: u64 },

    /// The source worker panicked.
    Panicked { message: String },

    /// The source worker could not be started.
    Dispatch { message: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Read { message } => write!(f, "read error: {}", message),
            SourceError::Parse {
                message,
                line_errors,
            } => write!(f, "parse error: {} ({} bad lines)", message, line_errors),
            SourceError::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            SourceError::Panicked { message } => write!(f, "worker panicked: {}", message),
            SourceError::Dispatch { message } => write!(f, "dispatch failed: {}", message),
        }
    }
}

impl std::error::Error for SourceError {}

/// One malformed line that was skipped while parsing a source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    /// Source the line belongs to.
    pub source: SourceKind,
    /// 1-based line number within the raw input.
    pub line: usize,
    /// The offending line, verbatim.
    pub content: String,
    /// Human-readable reason.
    pub reason: String,
}

impl LineError {
    pub fn new(
        source: SourceKind,
        line: usize,
        content: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source,
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} line {}: {} ({:?})",
            self.source, self.line, self.reason, self.content
        )
    }
}

impl std::error::Error for LineError {}
