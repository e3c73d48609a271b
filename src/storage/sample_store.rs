//! Last-seen raw counter records, keyed by source kind and identifier.
//!
//! The store holds exactly one record per key: the most recent successful
//! sample. Rates are always derived against it, then it is overwritten.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::collector::procfs::{CpuTimes, DiskStats, KernelCounters, NetDevStats};
use crate::storage::model::SourceKind;

/// Identifier under which the scheduler counters of `/proc/stat` are stored.
pub const KERNEL_ID: &str = "kernel";

/// A raw counter record kept between ticks.
///
/// Memory has no variant: its metrics are instantaneous gauges.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Cpu(CpuTimes),
    Kernel(KernelCounters),
    Network(NetDevStats),
    Disk(DiskStats),
}

/// Conversion between a concrete record and [`Sample`].
pub trait SampleRecord: Sized {
    fn wrap(self) -> Sample;
    fn unwrap_ref(sample: &Sample) -> Option<&Self>;
}

macro_rules! impl_sample_record {
    ($ty:ty, $variant:ident) => {
        impl SampleRecord for $ty {
            fn wrap(self) -> Sample {
                Sample::$variant(self)
            }

            fn unwrap_ref(sample: &Sample) -> Option<&Self> {
                match sample {
                    Sample::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_sample_record!(CpuTimes, Cpu);
impl_sample_record!(KernelCounters, Kernel);
impl_sample_record!(NetDevStats, Network);
impl_sample_record!(DiskStats, Disk);

/// A value with the tick timestamp it was sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

/// Previous-sample table.
///
/// Owned by a single collector and only written during its merge phase, so
/// it needs no synchronisation.
#[derive(Debug, Default)]
pub struct SampleStore {
    entries: HashMap<(SourceKind, String), Stamped<Sample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous record for a key with its timestamp.
    ///
    /// `None` if the key was never stored, or holds a record of another type.
    pub fn get_previous<T: SampleRecord>(
        &self,
        source: SourceKind,
        id: &str,
    ) -> Option<(&T, DateTime<Utc>)> {
        let entry = self.entries.get(&(source, id.to_string()))?;
        T::unwrap_ref(&entry.value).map(|v| (v, entry.timestamp))
    }

    /// Stores `record` as the latest sample for a key, replacing any previous one.
    pub fn put<T: SampleRecord>(
        &mut self,
        source: SourceKind,
        id: impl Into<String>,
        record: T,
        timestamp: DateTime<Utc>,
    ) {
        self.entries.insert(
            (source, id.into()),
            Stamped {
                value: record.wrap(),
                timestamp,
            },
        );
    }

    /// Drops entries last refreshed before `cutoff`. Returns how many were removed.
    pub fn evict_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.timestamp >= cutoff);
        before - self.entries.len()
    }

    /// Number of entries stored for one source kind.
    pub fn count_for(&self, source: SourceKind) -> usize {
        self.entries.keys().filter(|(kind, _)| *kind == source).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cpu(user: u64) -> CpuTimes {
        CpuTimes {
            user,
            ..Default::default()
        }
    }

    #[test]
    fn put_then_get_previous() {
        let mut store = SampleStore::new();
        assert!(store.get_previous::<CpuTimes>(SourceKind::Cpu, "cpu0").is_none());

        store.put(SourceKind::Cpu, "cpu0", cpu(10), ts(0));
        let (prev, at) = store.get_previous::<CpuTimes>(SourceKind::Cpu, "cpu0").unwrap();
        assert_eq!(prev.user, 10);
        assert_eq!(at, ts(0));
    }

    #[test]
    fn put_overwrites() {
        let mut store = SampleStore::new();
        store.put(SourceKind::Cpu, "cpu0", cpu(10), ts(0));
        store.put(SourceKind::Cpu, "cpu0", cpu(20), ts(1));

        let (prev, at) = store.get_previous::<CpuTimes>(SourceKind::Cpu, "cpu0").unwrap();
        assert_eq!(prev.user, 20);
        assert_eq!(at, ts(1));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn keys_are_scoped_by_source() {
        let mut store = SampleStore::new();
        store.put(SourceKind::Cpu, KERNEL_ID, KernelCounters::default(), ts(0));
        store.put(
            SourceKind::Network,
            "eth0",
            NetDevStats {
                interface: "eth0".into(),
                ..Default::default()
            },
            ts(0),
        );

        assert!(store.get_previous::<NetDevStats>(SourceKind::Disk, "eth0").is_none());
        assert!(store.get_previous::<CpuTimes>(SourceKind::Cpu, KERNEL_ID).is_none());
        assert!(store.get_previous::<KernelCounters>(SourceKind::Cpu, KERNEL_ID).is_some());
        assert_eq!(store.count_for(SourceKind::Network), 1);
    }

    #[test]
    fn evict_older_than_cutoff() {
        let mut store = SampleStore::new();
        store.put(SourceKind::Cpu, "cpu0", cpu(1), ts(0));
        store.put(SourceKind::Cpu, "cpu1", cpu(1), ts(10));
        store.put(SourceKind::Cpu, "cpu2", cpu(1), ts(20));

        let removed = store.evict_older_than(ts(20) - Duration::seconds(10));
        assert_eq!(removed, 1);
        assert!(store.get_previous::<CpuTimes>(SourceKind::Cpu, "cpu0").is_none());
        assert!(store.get_previous::<CpuTimes>(SourceKind::Cpu, "cpu1").is_some());

        store.clear();
        assert!(store.is_empty());
    }
}
