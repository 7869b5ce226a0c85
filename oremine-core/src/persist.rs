//! Writing leaves into the mirrored output tree.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use tempfile::NamedTempFile;

use crate::task::ScanTask;

/// Where `task` lands: `destination/sub_path` with the resolved extension
/// appended (the format's extension, or the source extension when the format
/// has none).
pub fn output_path(destination: &Path, task: &ScanTask) -> PathBuf {
    let extension = if task.format.extension.is_empty() {
        task.extension.as_str()
    } else {
        task.format.extension.as_str()
    };
    let mut name: OsString = destination.join(&task.sub_path).into_os_string();
    name.push(extension);
    PathBuf::from(name)
}

/// Copy the task's stream to its output path and return the path written.
pub fn persist(destination: &Path, task: &ScanTask) -> Result<PathBuf> {
    let mut target = output_path(destination, task);
    if let Some(parent) = target.parent() {
        make_parent_dirs(destination, parent)?;
    }
    // a directory already took this name (an earlier container expanded here)
    while target.is_dir() {
        target = suffixed(&target);
    }
    write_atomic(&target, &task.data)?;
    Ok(target)
}

/// Create `dir` below `destination`. Any ancestor that exists as a plain file
/// is renamed with a `_` suffix first, so the directory can take its place.
fn make_parent_dirs(destination: &Path, dir: &Path) -> Result<()> {
    let relative = dir.strip_prefix(destination).unwrap_or(dir);
    let mut current = destination.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_file() => rename_aside(&current)?,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to inspect {}", current.display()))
            }
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

fn rename_aside(file: &Path) -> Result<()> {
    let mut renamed = suffixed(file);
    while renamed.exists() {
        renamed = suffixed(&renamed);
    }
    debug!("Moving {} aside to {}", file.display(), renamed.display());
    match fs::rename(file, &renamed) {
        Ok(()) => Ok(()),
        // another worker moved it first
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to rename {}", file.display())),
    }
}

fn suffixed(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push("_");
    PathBuf::from(name)
}

/// Write through a temp file in the target directory; the target only appears
/// once every byte is on disk.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write {}", target.display()))?;
    tmp.persist(target)
        .with_context(|| format!("Failed to move temp file to {}", target.display()))?;
    Ok(())
}
