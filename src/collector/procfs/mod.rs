//! Readers and parsers for the Linux `/proc` filesystem.
//!
//! `reader` fetches the raw text of a source; `parser` turns it into
//! counter records without touching any state.

pub mod parser;
mod reader;

pub use parser::{
    CpuTimes, DiskStats, KernelCounters, MemInfo, NetDevStats, ParseError, Parsed, StatRecord,
    parse_cpu_stat, parse_diskstats, parse_meminfo, parse_net_dev,
};
pub use reader::{DEFAULT_PROC_PATH, ProcfsReader};
