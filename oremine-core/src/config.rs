//! Scan configuration and cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::progress::ProgressSnapshot;

/// Progress observer. Invoked under the progress lock, so it must be quick.
pub type ProgressFn = dyn Fn(&ProgressSnapshot) + Send + Sync;

/// Cloneable stop signal. Raising it stops new dispatch; handlers already
/// running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct ScanConfig {
    /// Worker count for top-level files.
    pub max_parallelism: usize,
    pub progress: Option<Arc<ProgressFn>>,
    /// Run the decompression cascade and the cutter on unknown streams.
    pub force: bool,
    /// One worker, depth-first; makes runs reproducible.
    pub debug_serial: bool,
    /// Also persist depth-0 leaves (the input files themselves).
    pub persist_root: bool,
    pub max_depth: u32,
    /// Stop at the first handler failure and return it.
    pub fail_fast: bool,
    pub cancel: CancelToken,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 4,
            progress: None,
            force: false,
            debug_serial: false,
            persist_root: false,
            max_depth: 32,
            fail_fast: cfg!(debug_assertions),
            cancel: CancelToken::new(),
        }
    }
}

impl ScanConfig {
    pub fn workers(&self) -> usize {
        if self.debug_serial {
            1
        } else {
            self.max_parallelism.max(1)
        }
    }

    /// Archive members run at half the file parallelism.
    pub fn member_workers(&self) -> usize {
        (self.workers() / 2).max(1)
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("max_parallelism", &self.max_parallelism)
            .field("progress", &self.progress.is_some())
            .field("force", &self.force)
            .field("debug_serial", &self.debug_serial)
            .field("persist_root", &self.persist_root)
            .field("max_depth", &self.max_depth)
            .field("fail_fast", &self.fail_fast)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
