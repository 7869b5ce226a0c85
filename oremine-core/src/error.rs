use std::path::PathBuf;

use thiserror::Error;

/// Session-level failures. Everything below file granularity is contained
/// and logged instead of surfacing here.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Input path does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Handler panicked while processing {path}: {message}")]
    Panicked { path: String, message: String },

    #[error("Worker pool could not be started")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
