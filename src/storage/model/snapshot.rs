//! Snapshot structures handed to consumers.
//!
//! A snapshot is produced on every tick, even when some (or all) sources
//! failed. Data for a source lives in its [`MetricsBlock`]; a failed source
//! has an entry in [`Snapshot::errors`] instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::source::{LineError, SourceError, SourceKind};
use super::system::{CpuMetrics, DiskMetrics, MemoryMetrics, NetworkMetrics};

/// Derived metrics of one source kind.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum MetricsBlock {
    /// Source: `/proc/stat`
    Cpu(CpuMetrics),

    /// Source: `/proc/meminfo`
    Memory(MemoryMetrics),

    /// Source: `/proc/net/dev`
    Network(NetworkMetrics),

    /// Source: `/proc/diskstats`
    Disk(DiskMetrics),
}

impl MetricsBlock {
    pub fn source(&self) -> SourceKind {
        match self {
            MetricsBlock::Cpu(_) => SourceKind::Cpu,
            MetricsBlock::Memory(_) => SourceKind::Memory,
            MetricsBlock::Network(_) => SourceKind::Network,
            MetricsBlock::Disk(_) => SourceKind::Disk,
        }
    }
}

/// Point-in-time result of one collection tick.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Snapshot {
    /// Tick timestamp; every source of the tick was sampled against it.
    pub timestamp: DateTime<Utc>,
    /// Host identity.
    pub host: String,
    /// One block per source that produced data, ordered by source kind.
    pub blocks: Vec<MetricsBlock>,
    /// Sources that produced no data this tick.
    pub errors: BTreeMap<SourceKind, SourceError>,
    /// Lines skipped inside sources that otherwise succeeded.
    pub warnings: Vec<LineError>,
}

impl Snapshot {
    pub fn cpu(&self) -> Option<&CpuMetrics> {
        self.blocks.iter().find_map(|b| match b {
            MetricsBlock::Cpu(v) => Some(v),
            _ => None,
        })
    }

    pub fn memory(&self) -> Option<&MemoryMetrics> {
        self.blocks.iter().find_map(|b| match b {
            MetricsBlock::Memory(v) => Some(v),
            _ => None,
        })
    }

    pub fn network(&self) -> Option<&NetworkMetrics> {
        self.blocks.iter().find_map(|b| match b {
            MetricsBlock::Network(v) => Some(v),
            _ => None,
        })
    }

    pub fn disk(&self) -> Option<&DiskMetrics> {
        self.blocks.iter().find_map(|b| match b {
            MetricsBlock::Disk(v) => Some(v),
            _ => None,
        })
    }

    /// Returns the error recorded for `source`, if it failed this tick.
    pub fn error(&self, source: SourceKind) -> Option<&SourceError> {
        self.errors.get(&source)
    }

    /// True when no source failed.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}
