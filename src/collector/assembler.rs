//! Builds the immutable [`Snapshot`] at the end of a tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::storage::model::{LineError, MetricsBlock, Snapshot, SourceError, SourceKind};

/// Accumulates per-source results during the merge phase.
#[derive(Debug, Default)]
pub struct SnapshotAssembler {
    blocks: Vec<MetricsBlock>,
    errors: BTreeMap<SourceKind, SourceError>,
    warnings: Vec<LineError>,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: MetricsBlock) {
        self.blocks.push(block);
    }

    pub fn add_error(&mut self, source: SourceKind, error: SourceError) {
        self.errors.insert(source, error);
    }

    pub fn add_warnings(&mut self, warnings: impl IntoIterator<Item = LineError>) {
        self.warnings.extend(warnings);
    }

    /// Finalizes the snapshot. Blocks are ordered by source kind.
    pub fn assemble(mut self, timestamp: DateTime<Utc>, host: impl Into<String>) -> Snapshot {
        self.blocks.sort_by_key(MetricsBlock::source);
        Snapshot {
            timestamp,
            host: host.into(),
            blocks: self.blocks,
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}
