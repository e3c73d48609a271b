//! Host metrics collector for Linux.
//!
//! This module provides infrastructure for sampling kernel counters from the
//! Linux `/proc` filesystem and turning them into snapshots, with support for
//! mocking for testing on macOS.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Collector                           │
//! │   dispatch ──► one worker per source ──► mpsc ──► merge      │
//! │                       │                             │        │
//! │                ┌──────▼──────┐              ┌───────▼──────┐ │
//! │                │ SourceReader│ (trait)      │ SampleStore  │ │
//! │                └──────┬──────┘              │ + rates      │ │
//! │                       │                     └───────┬──────┘ │
//! │                ┌──────▼──────┐              ┌───────▼──────┐ │
//! │                │ProcfsReader │              │  Assembler   │ │
//! │                └──────┬──────┘              └──────────────┘ │
//! └───────────────────────┼──────────────────────────────────────┘
//!                         │
//!              ┌──────────▼──────────┐
//!              │  FileSystem (trait) │
//!              └──────────┬──────────┘
//!           ┌─────────────┼─────────────┐
//!    ┌──────▼──────┐ ┌────▼────────┐ ┌──▼──────────┐
//!    │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!    │  (Linux)    │ │  (Testing)  │ │  (Fixtures) │
//!    └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use perfcollector::collector::{Collector, CollectorConfig, ProcfsReader, RealFs};
//!
//! let reader = ProcfsReader::new(RealFs::new(), "/proc");
//! let mut collector = Collector::new(reader, CollectorConfig::default());
//! let snapshot = collector.collect_once(chrono::Utc::now());
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use perfcollector::collector::{Collector, CollectorConfig, MockFs, ProcfsReader};
//!
//! let reader = ProcfsReader::new(MockFs::typical_system(), "/proc");
//! let mut collector = Collector::new(reader, CollectorConfig::default());
//! let snapshot = collector.collect_once(chrono::Utc::now());
//! assert_eq!(snapshot.blocks.len(), 4);
//! ```

mod assembler;
#[allow(clippy::module_inception)]
mod collector;
mod dispatch;
pub mod mock;
pub mod procfs;
pub mod traits;

pub use assembler::SnapshotAssembler;
pub use collector::{Collector, CollectorConfig, CollectorTiming, DEFAULT_TIMEOUT, UNKNOWN_HOST};
pub use dispatch::{
    LateWorkers, SourceData, SourceOutcome, SourceReport, dispatch, fetch_and_parse,
};
pub use mock::MockFs;
pub use procfs::{DEFAULT_PROC_PATH, ProcfsReader};
pub use traits::{FileSystem, RealFs, SourceReader};
