//! Force recovery for streams nothing recognized.
//!
//! First every codec gets a chance to decode the stream. If none does, the
//! cutter re-segments it on known signatures. Cutting is expensive and
//! mostly fruitless on a run of same-format noise, so a back-off record stops
//! cutting a format once it has missed more than [`MAX_FAILURES`] times in a
//! row. The attempt after the last allowed miss still runs.

use std::sync::Arc;

use bytes::Bytes;
use gamearc::formats::cutter;
use gamearc::{try_decompress_any, FormatInfo};
use log::debug;
use parking_lot::Mutex;

use crate::progress::RecoveryStats;
use crate::scan_log::{FileAction, ScanLog};
use crate::task::{ScanTask, Spawn};

pub const MAX_FAILURES: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strikes {
    Failures(u32),
    /// The cutter succeeded on this format once; it is never skipped.
    Trusted,
}

/// Outcome of the most recent cut attempts, keyed by the format they ran on.
#[derive(Debug, Clone, Default)]
pub struct BackOff {
    format: Option<Arc<FormatInfo>>,
    strikes: Option<Strikes>,
}

impl BackOff {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_current(&self, format: &FormatInfo) -> bool {
        self.format.as_deref() == Some(format)
    }

    pub fn should_skip(&self, format: &FormatInfo) -> bool {
        self.is_current(format)
            && matches!(self.strikes, Some(Strikes::Failures(n)) if n > MAX_FAILURES)
    }

    pub fn record(&mut self, format: &Arc<FormatInfo>, success: bool) {
        let next = match (success, self.is_current(format), self.strikes) {
            (true, _, _) => Strikes::Trusted,
            (false, true, Some(Strikes::Trusted)) => Strikes::Trusted,
            (false, true, Some(Strikes::Failures(n))) => Strikes::Failures(n.saturating_add(1)),
            (false, _, _) => Strikes::Failures(1),
        };
        self.format = Some(Arc::clone(format));
        self.strikes = Some(next);
    }

    pub fn strikes(&self) -> Option<Strikes> {
        self.strikes
    }
}

/// Shared force-recovery state of one scan.
pub struct ForceRecovery {
    backoff: Mutex<BackOff>,
    signatures: Vec<&'static [u8]>,
    pub stats: RecoveryStats,
}

impl ForceRecovery {
    pub fn new(signatures: Vec<&'static [u8]>) -> Self {
        Self {
            backoff: Mutex::new(BackOff::new()),
            signatures,
            stats: RecoveryStats::default(),
        }
    }

    /// Children recovered from `task`, or `None` when it stays unknown.
    pub fn try_force(&self, task: &ScanTask, log: &ScanLog) -> Option<Vec<Spawn>> {
        if let Some(spawn) = cascade(task) {
            RecoveryStats::bump(&self.stats.cascade_hits);
            log.log_event(
                FileAction::Recovered,
                &task.display_path(),
                &format!("Decompressed to {} bytes", spawn.data.len()),
            );
            return Some(vec![spawn]);
        }

        if self.backoff.lock().should_skip(&task.format) {
            debug!("Skipping cut of {}: format keeps failing", task.display_path());
            RecoveryStats::bump(&self.stats.cuts_skipped);
            return None;
        }

        RecoveryStats::bump(&self.stats.cuts_attempted);
        let archive = cutter::cut(&task.data, 0, &self.signatures);
        let found = archive.total_file_count();
        self.backoff.lock().record(&task.format, found > 0);
        if found == 0 {
            return None;
        }

        RecoveryStats::bump(&self.stats.cuts_succeeded);
        log.log_event(
            FileAction::Recovered,
            &task.display_path(),
            &format!("Cut into {found} members"),
        );
        Some(
            archive
                .into_files()
                .into_iter()
                .map(|(path, file)| Spawn::member(task, &path, file.data))
                .collect(),
        )
    }
}

/// Decode `task` with the first codec that accepts it.
pub fn cascade(task: &ScanTask) -> Option<Spawn> {
    let (decoded, codec) = try_decompress_any(&task.data)?;
    debug!(
        "{} decoded by {} ({} -> {} bytes)",
        task.display_path(),
        codec.name(),
        task.len(),
        decoded.len()
    );
    Some(Spawn::replacement(task, Bytes::from(decoded)))
}
