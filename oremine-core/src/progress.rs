//! Shared progress counters and the run summary.
//!
//! Every counter mutation and every callback invocation happens under one
//! mutex, so the forward-only filter always compares consistent snapshots of
//! both file and byte counts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::ProgressFn;

/// What one callback observes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub processed_files: u64,
    pub total_files: u64,
    pub processed_bytes: u64,
    pub total_bytes: u64,
    pub is_final: bool,
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Classified leaf written to the output tree.
    Persisted,
    /// Replaced by its members or decoded payload.
    Expanded,
    Unknown,
    Unsupported,
    Failed,
    /// Classified depth-0 leaf left where it is.
    InPlace,
    DepthLimited,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Dispositions {
    pub persisted: u64,
    pub expanded: u64,
    pub unknown: u64,
    pub unsupported: u64,
    pub failed: u64,
    pub in_place: u64,
    pub depth_limited: u64,
}

impl Dispositions {
    pub fn record(&mut self, disposition: Disposition) {
        let slot = match disposition {
            Disposition::Persisted => &mut self.persisted,
            Disposition::Expanded => &mut self.expanded,
            Disposition::Unknown => &mut self.unknown,
            Disposition::Unsupported => &mut self.unsupported,
            Disposition::Failed => &mut self.failed,
            Disposition::InPlace => &mut self.in_place,
            Disposition::DepthLimited => &mut self.depth_limited,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.persisted
            + self.expanded
            + self.unknown
            + self.unsupported
            + self.failed
            + self.in_place
            + self.depth_limited
    }
}

/// Force-recovery counters; independent of the progress lock.
#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub cascade_hits: AtomicU64,
    pub cuts_attempted: AtomicU64,
    pub cuts_skipped: AtomicU64,
    pub cuts_succeeded: AtomicU64,
}

impl RecoveryStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RecoveryCounts {
        RecoveryCounts {
            cascade_hits: self.cascade_hits.load(Ordering::Relaxed),
            cuts_attempted: self.cuts_attempted.load(Ordering::Relaxed),
            cuts_skipped: self.cuts_skipped.load(Ordering::Relaxed),
            cuts_succeeded: self.cuts_succeeded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryCounts {
    pub cascade_hits: u64,
    pub cuts_attempted: u64,
    pub cuts_skipped: u64,
    pub cuts_succeeded: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResults {
    pub total_files: u64,
    pub processed_files: u64,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub log_path: Option<PathBuf>,
    /// Tasks taken off the queue, files and members alike.
    pub tasks_processed: u64,
    pub dispositions: Dispositions,
    pub recovery: RecoveryCounts,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct ProgressState {
    total_files: u64,
    total_bytes: u64,
    processed_files: u64,
    processed_bytes: u64,
    last_reported: Option<ProgressSnapshot>,
    dispositions: Dispositions,
}

impl ProgressState {
    fn clamped(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed_files: self.processed_files.min(self.total_files),
            total_files: self.total_files,
            processed_bytes: self.processed_bytes.min(self.total_bytes),
            total_bytes: self.total_bytes,
            is_final: false,
        }
    }
}

pub struct ProgressTracker {
    state: Mutex<ProgressState>,
    callback: Option<Arc<ProgressFn>>,
}

impl ProgressTracker {
    pub fn new(total_files: u64, total_bytes: u64, callback: Option<Arc<ProgressFn>>) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                total_files,
                total_bytes,
                ..Default::default()
            }),
            callback,
        }
    }

    /// Emit the starting snapshot.
    pub fn start(&self) {
        let mut state = self.state.lock();
        self.report(&mut state);
    }

    /// A member settled: credit its bytes live, and retract what its own
    /// members had been credited.
    pub fn member_settled(&self, weight: u64, claimed: u64) {
        let mut state = self.state.lock();
        state.processed_bytes = state.processed_bytes.saturating_sub(claimed) + weight;
        self.report(&mut state);
    }

    /// A top-level file settled: its members' credit is replaced by the file
    /// length and the file counts as processed.
    pub fn file_settled(&self, len: u64, claimed: u64) {
        let mut state = self.state.lock();
        state.processed_bytes = state.processed_bytes.saturating_sub(claimed) + len;
        state.processed_files += 1;
        self.report(&mut state);
    }

    pub fn record(&self, disposition: Disposition) {
        self.state.lock().dispositions.record(disposition);
    }

    pub fn dispositions(&self) -> Dispositions {
        self.state.lock().dispositions
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().clamped()
    }

    /// Issue the terminal report. A completed run reports the totals exactly;
    /// a cancelled one reports where it stopped.
    pub fn finish(&self, cancelled: bool) -> ProgressSnapshot {
        let mut state = self.state.lock();
        let mut snapshot = state.clamped();
        if !cancelled {
            snapshot.processed_files = state.total_files;
            snapshot.processed_bytes = state.total_bytes;
        }
        snapshot.is_final = true;
        if let Some(cb) = &self.callback {
            cb(&snapshot);
        }
        state.last_reported = Some(snapshot);
        snapshot
    }

    /// Forward-only: a snapshot is reported when neither counter went back
    /// and at least one moved.
    fn report(&self, state: &mut ProgressState) {
        let snapshot = state.clamped();
        let forward = match state.last_reported {
            None => true,
            Some(last) => {
                snapshot.processed_files >= last.processed_files
                    && snapshot.processed_bytes >= last.processed_bytes
                    && snapshot != last
            }
        };
        if !forward {
            return;
        }
        if let Some(cb) = &self.callback {
            cb(&snapshot);
        }
        state.last_reported = Some(snapshot);
    }
}
