use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use gamearc::FormatInfo;

use crate::util::{sanitized_relative, split_extension};

/// One identified stream waiting for the dispatcher.
#[derive(Debug, Clone)]
pub struct ScanTask {
    pub data: Bytes,
    /// Output-relative path without the extension.
    pub sub_path: PathBuf,
    /// Source extension, lowercase with a leading dot, or empty.
    pub extension: String,
    pub format: Arc<FormatInfo>,
    pub depth: u32,
}

impl ScanTask {
    /// Path plus source extension, as it appears in log lines.
    pub fn display_path(&self) -> String {
        format!("{}{}", self.sub_path.display(), self.extension)
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A child stream produced by the dispatcher, not yet identified.
#[derive(Debug, Clone)]
pub struct Spawn {
    pub data: Bytes,
    pub sub_path: PathBuf,
    pub extension: String,
    pub depth: u32,
    /// Bytes this child credits to progress when it settles.
    pub weight: u64,
}

impl Spawn {
    /// Container member at `relative` (already sanitized) below the parent's path.
    pub fn member(parent: &ScanTask, relative: &Path, data: Bytes) -> Self {
        let (stem, extension) = split_extension(relative);
        Self {
            weight: data.len() as u64,
            data,
            sub_path: parent.sub_path.join(stem),
            extension,
            depth: parent.depth + 1,
        }
    }

    /// Legacy table entry; these do not count towards byte progress.
    pub fn entry(parent: &ScanTask, name: &str, data: Bytes) -> Self {
        let mut spawn = Self::member(parent, &sanitized_relative(name), data);
        spawn.weight = 0;
        spawn
    }

    /// Decoded payload replacing the parent at the same path.
    pub fn replacement(parent: &ScanTask, data: Bytes) -> Self {
        Self {
            data,
            sub_path: parent.sub_path.clone(),
            extension: String::new(),
            depth: parent.depth + 1,
            weight: 0,
        }
    }
}
