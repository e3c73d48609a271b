//! Data model for collection results.
//!
//! - `source` - source kinds and error taxonomy
//! - `system` - derived CPU, memory, network and disk metrics
//! - `snapshot` - the per-tick snapshot handed to consumers

mod snapshot;
mod source;
mod system;

pub use snapshot::{MetricsBlock, Snapshot};
pub use source::{LineError, SourceError, SourceKind};
pub use system::{
    CpuMetrics, CpuUsage, Derivation, DiskActivity, DiskMetrics, DiskRates, KernelActivity,
    KernelRates, MemoryMetrics, NetRates, NetworkMetrics, TOTAL_CPU_KEY,
};
