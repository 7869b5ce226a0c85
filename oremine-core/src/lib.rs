//! oremine-core - recursive asset mining over game archives.
//!
//! [`scan`] walks an input tree, identifies every stream with
//! [`FormatIdentifier`], expands containers and codecs through `gamearc`
//! handlers, and writes classified leaves into a mirrored output tree.
//! Members of members are handled the same way, down to
//! [`ScanConfig::max_depth`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod identify;
pub mod persist;
pub mod progress;
pub mod queue;
pub mod recovery;
pub mod scan_log;
pub mod scheduler;
pub mod task;
pub mod util;

pub use crate::config::{CancelToken, ProgressFn, ScanConfig};
pub use crate::dispatch::{Outcome, ScanSession};
pub use crate::error::ScanError;
pub use crate::identify::FormatIdentifier;
pub use crate::progress::{Disposition, Dispositions, ProgressSnapshot, RecoveryCounts, ScanResults};
pub use crate::recovery::{BackOff, Strikes, MAX_FAILURES};
pub use crate::scan_log::{FileAction, ScanLog};
pub use crate::scheduler::{collect_files, scan, FileListing, SourceFile};
pub use crate::task::{ScanTask, Spawn};
