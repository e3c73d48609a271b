//! Per-tick fan-out of source reads onto worker threads.
//!
//! Each enabled source gets its own short-lived thread that reads and
//! parses the raw input, then reports back over a channel. The coordinator
//! waits until every source reported or the deadline passed, whichever
//! comes first. Workers that miss the deadline keep running until their
//! read returns, but their result lands in a dropped receiver.
//!
//! A late worker is remembered across ticks: its source is not dispatched
//! again until that worker exits, so a read that never returns pins at most
//! one thread per source.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::collector::procfs::{
    DiskStats, MemInfo, NetDevStats, Parsed, StatRecord, parse_cpu_stat, parse_diskstats,
    parse_meminfo, parse_net_dev,
};
use crate::collector::traits::SourceReader;
use crate::storage::model::{LineError, SourceError, SourceKind};

/// Parsed records of one source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Cpu(Parsed<StatRecord>),
    Memory(Parsed<MemInfo>),
    Network(Parsed<Vec<NetDevStats>>),
    Disk(Parsed<Vec<DiskStats>>),
}

impl SourceData {
    pub fn line_errors(&self) -> &[LineError] {
        match self {
            SourceData::Cpu(p) => &p.line_errors,
            SourceData::Memory(p) => &p.line_errors,
            SourceData::Network(p) => &p.line_errors,
            SourceData::Disk(p) => &p.line_errors,
        }
    }
}

pub type SourceOutcome = Result<SourceData, SourceError>;

/// Workers that missed a previous deadline and may still be running.
pub type LateWorkers = BTreeMap<SourceKind, JoinHandle<()>>;

/// What one source produced during a tick, and how long it took.
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub outcome: SourceOutcome,
    pub elapsed: Duration,
}

/// Reads and parses one source on the calling thread.
pub fn fetch_and_parse<R: SourceReader + ?Sized>(reader: &R, source: SourceKind) -> SourceOutcome {
    let content = reader.read(source).map_err(|e| SourceError::Read {
        message: e.to_string(),
    })?;

    let data = match source {
        SourceKind::Cpu => SourceData::Cpu(parse_cpu_stat(&content)?),
        SourceKind::Memory => SourceData::Memory(parse_meminfo(&content)?),
        SourceKind::Network => SourceData::Network(parse_net_dev(&content)?),
        SourceKind::Disk => SourceData::Disk(parse_diskstats(&content)?),
    };
    Ok(data)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs every source in parallel and collects a report per source.
///
/// Always returns exactly one report for each distinct source in `sources`,
/// within roughly `timeout` of being called.
///
/// `late` carries workers between calls. A source whose previous worker is
/// still running is reported as timed out without spawning a new one;
/// workers missing this deadline are added to it.
pub fn dispatch<R: SourceReader + 'static>(
    reader: &Arc<R>,
    sources: &[SourceKind],
    timeout: Duration,
    late: &mut LateWorkers,
) -> BTreeMap<SourceKind, SourceReport> {
    let started = Instant::now();
    let deadline = started + timeout;
    let after_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
    let mut reports = BTreeMap::new();
    let mut pending: BTreeSet<SourceKind> = BTreeSet::new();
    let mut handles: LateWorkers = BTreeMap::new();

    late.retain(|_, handle| !handle.is_finished());

    let (tx, rx) = mpsc::channel::<(SourceKind, SourceOutcome, Duration)>();

    for &source in sources.iter().collect::<BTreeSet<_>>() {
        if late.contains_key(&source) {
            debug!(source = %source, "previous worker still running, not dispatched");
            reports.insert(
                source,
                SourceReport {
                    outcome: Err(SourceError::Timeout { after_ms }),
                    elapsed: Duration::ZERO,
                },
            );
            continue;
        }

        let worker_tx = tx.clone();
        let worker_reader = Arc::clone(reader);
        let spawned = thread::Builder::new()
            .name(format!("collect-{}", source))
            .spawn(move || {
                let t = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    fetch_and_parse(worker_reader.as_ref(), source)
                }))
                .unwrap_or_else(|payload| {
                    Err(SourceError::Panicked {
                        message: panic_message(payload.as_ref()),
                    })
                });
                // Receiver is gone once the tick deadline passed.
                let _ = worker_tx.send((source, outcome, t.elapsed()));
            });

        match spawned {
            Ok(handle) => {
                pending.insert(source);
                handles.insert(source, handle);
            }
            Err(e) => {
                reports.insert(
                    source,
                    SourceReport {
                        outcome: Err(SourceError::Dispatch {
                            message: e.to_string(),
                        }),
                        elapsed: Duration::ZERO,
                    },
                );
            }
        }
    }
    drop(tx);

    trace!(pending = pending.len(), "dispatching -> awaiting");

    while !pending.is_empty() {
        let wait = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(wait) {
            Ok((source, outcome, elapsed)) => {
                pending.remove(&source);
                reports.insert(source, SourceReport { outcome, elapsed });
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                for source in std::mem::take(&mut pending) {
                    reports.insert(
                        source,
                        SourceReport {
                            outcome: Err(SourceError::Panicked {
                                message: "worker exited without reporting".to_string(),
                            }),
                            elapsed: started.elapsed(),
                        },
                    );
                }
            }
        }
    }

    for source in pending {
        if let Some(handle) = handles.remove(&source) {
            debug!(source = %source, "worker missed the deadline, left running");
            late.insert(source, handle);
        }
        reports.insert(
            source,
            SourceReport {
                outcome: Err(SourceError::Timeout { after_ms }),
                elapsed: started.elapsed(),
            },
        );
    }

    reports
}
