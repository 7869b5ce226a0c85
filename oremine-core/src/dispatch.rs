//! Per-task dispatch: decide what an identified stream is worth, expand it
//! when a handler exists, and persist or log it otherwise.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use gamearc::formats::cutter;
use gamearc::{ArchiveFormat, Codec, FileType, Handler, LegacyTable};
use log::{debug, warn};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::identify::FormatIdentifier;
use crate::persist;
use crate::progress::{Disposition, ProgressTracker};
use crate::recovery::{self, ForceRecovery};
use crate::scan_log::{FileAction, ScanLog};
use crate::task::{ScanTask, Spawn};
use crate::util::{hex_preview, size_suffix};

/// Containers larger than this are not searched for appended payloads.
const HIDDEN_SCAN_LIMIT: u64 = 500 * 1024 * 1024;

/// Extensions that usually wrap a compressed payload even when nothing in the
/// registry claims the stream.
const COMPRESSED_HINTS: &[&str] = &[
    ".arc", ".tpl", ".bti", ".lz", ".brres", ".breff", ".zlib", ".lz77", ".wtm", ".vld", ".cxd",
    ".cms", ".cmp", ".cmparc", ".cmpres",
];

/// What one task turned into.
#[derive(Debug)]
pub struct Outcome {
    pub disposition: Disposition,
    pub spawns: Vec<Spawn>,
}

impl Outcome {
    fn leaf(disposition: Disposition) -> Self {
        Self {
            disposition,
            spawns: Vec::new(),
        }
    }

    fn expanded(spawns: Vec<Spawn>) -> Self {
        Self {
            disposition: Disposition::Expanded,
            spawns,
        }
    }
}

/// Everything the workers of one scan share.
pub struct ScanSession {
    pub config: ScanConfig,
    destination: PathBuf,
    identifier: FormatIdentifier,
    pub log: ScanLog,
    pub tracker: ProgressTracker,
    pub recovery: ForceRecovery,
}

impl ScanSession {
    pub fn new(config: ScanConfig, destination: &Path, log: ScanLog, tracker: ProgressTracker) -> Self {
        let identifier = FormatIdentifier::new();
        Self {
            config,
            destination: destination.to_path_buf(),
            recovery: ForceRecovery::new(gamearc::registry().signatures()),
            identifier,
            log,
            tracker,
        }
    }

    /// Identify a child stream and turn it into a task.
    pub fn admit(&self, spawn: Spawn) -> ScanTask {
        let format = self.identifier.identify(&spawn.data, &spawn.extension);
        ScanTask {
            data: spawn.data,
            sub_path: spawn.sub_path,
            extension: spawn.extension,
            format,
            depth: spawn.depth,
        }
    }

    /// Process `task` with failures contained: an error or panic is logged,
    /// the raw stream is kept, and the task counts as failed. Only with
    /// `fail_fast` does the error come back to the caller.
    pub fn dispatch(&self, task: &ScanTask) -> Result<Outcome> {
        let error = match panic::catch_unwind(AssertUnwindSafe(|| self.process(task))) {
            Ok(Ok(outcome)) => {
                self.tracker.record(outcome.disposition);
                return Ok(outcome);
            }
            Ok(Err(e)) => e,
            Err(payload) => ScanError::Panicked {
                path: task.display_path(),
                message: panic_message(payload.as_ref()),
            }
            .into(),
        };

        self.log.log_exception(&error, &task.display_path());
        if self.should_persist(task) {
            if let Err(e) = self.persist(task) {
                warn!("Could not keep raw copy of {}: {:#}", task.display_path(), e);
            }
        }
        self.tracker.record(Disposition::Failed);
        if self.config.fail_fast {
            return Err(error);
        }
        Ok(Outcome::leaf(Disposition::Failed))
    }

    pub fn process(&self, task: &ScanTask) -> Result<Outcome> {
        if task.depth > self.config.max_depth {
            self.log.log_event(
                FileAction::DepthLimit,
                &task.display_path(),
                &format!("Depth {} exceeds limit {}", task.depth, self.config.max_depth),
            );
            self.persist(task)?;
            return Ok(Outcome::leaf(Disposition::DepthLimited));
        }

        match task.format.file_type {
            FileType::Unknown => self.process_unknown(task),
            FileType::Rom | FileType::Archive => match self.try_extract(task)? {
                Some(spawns) => Ok(Outcome::expanded(spawns)),
                None => {
                    self.log.log_event(
                        FileAction::Unsupported,
                        &format!("{} ~{}", task.display_path(), size_suffix(task.len())),
                        &format!("Description: {}", task.format.full_description()),
                    );
                    self.persist(task)?;
                    Ok(Outcome::leaf(Disposition::Unsupported))
                }
            },
            _ => {
                if self.persist_leaf(task)? {
                    Ok(Outcome::leaf(Disposition::Persisted))
                } else {
                    Ok(Outcome::leaf(Disposition::InPlace))
                }
            }
        }
    }

    fn process_unknown(&self, task: &ScanTask) -> Result<Outcome> {
        if self.config.force {
            if let Some(spawns) = self.recovery.try_force(task, &self.log) {
                return Ok(Outcome::expanded(spawns));
            }
        }
        self.log
            .log_event(FileAction::Unknown, &task.display_path(), &unknown_description(task));
        self.persist_leaf(task)?;
        Ok(Outcome::leaf(Disposition::Unknown))
    }

    /// Structured extraction. `None` means no handler could expand the stream.
    pub fn try_extract(&self, task: &ScanTask) -> Result<Option<Vec<Spawn>>> {
        let Some(handler) = task.format.handler else {
            if has_compressed_hint(task) {
                return Ok(recovery::cascade(task).map(|spawn| vec![spawn]));
            }
            return Ok(None);
        };

        match handler {
            Handler::Container(format) => self.open_container(task, format).map(Some),
            Handler::Codec(codec) => decode(task, codec),
            Handler::Legacy(table) => self.read_legacy(task, table).map(Some),
        }
    }

    fn open_container(&self, task: &ScanTask, format: &dyn ArchiveFormat) -> Result<Vec<Spawn>> {
        let archive = format
            .open(task.data.clone())
            .with_context(|| format!("{} could not open {}", format.name(), task.display_path()))?;
        let members_end = archive.last_member_end();
        let mut spawns: Vec<Spawn> = archive
            .into_files()
            .into_iter()
            .map(|(path, file)| Spawn::member(task, &path, file.data))
            .collect();

        if task.len() > HIDDEN_SCAN_LIMIT {
            return Ok(spawns);
        }
        let Some(signature) = format.self_signature() else {
            return Ok(spawns);
        };

        let start = members_end.unwrap_or(0).max(signature.len() as u64);
        let hidden = cutter::cut(&task.data, start, &[signature]);
        if hidden.total_file_count() > 0 {
            debug!(
                "{}: {} hidden {} payload(s) after offset {:#x}",
                task.display_path(),
                hidden.total_file_count(),
                format.name(),
                start
            );
            spawns.extend(
                hidden
                    .into_files()
                    .into_iter()
                    .map(|(path, file)| Spawn::member(task, &path, file.data)),
            );
        }
        Ok(spawns)
    }

    fn read_legacy(&self, task: &ScanTask, table: LegacyTable) -> Result<Vec<Spawn>> {
        let entries = table
            .read_entries(&task.data)
            .with_context(|| format!("{} table unreadable in {}", table.name(), task.display_path()))?;
        let mut spawns = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.payload {
                Ok(data) => spawns.push(Spawn::entry(task, &entry.path, data)),
                Err(e) => self
                    .log
                    .log_exception(&e, &format!("{}/{}", task.display_path(), entry.path)),
            }
        }
        Ok(spawns)
    }

    pub fn should_persist(&self, task: &ScanTask) -> bool {
        task.depth > 0 || self.config.persist_root
    }

    /// Persist when the depth rule allows it; returns whether anything was written.
    fn persist_leaf(&self, task: &ScanTask) -> Result<bool> {
        if !self.should_persist(task) {
            return Ok(false);
        }
        self.persist(task)?;
        Ok(true)
    }

    fn persist(&self, task: &ScanTask) -> Result<()> {
        let written = persist::persist(&self.destination, task)?;
        debug!("Saved {}", written.display());
        Ok(())
    }
}

fn decode(task: &ScanTask, codec: &dyn Codec) -> Result<Option<Vec<Spawn>>> {
    if !codec.can_decompress() {
        return Ok(None);
    }
    let decoded = codec
        .decompress(&task.data)
        .with_context(|| format!("{} could not decode {}", codec.name(), task.display_path()))?;
    Ok(Some(vec![Spawn::replacement(task, Bytes::from(decoded))]))
}

fn has_compressed_hint(task: &ScanTask) -> bool {
    COMPRESSED_HINTS.contains(&task.extension.as_str())
        || COMPRESSED_HINTS.contains(&task.format.extension.as_str())
}

/// Log text for an unknown stream: the format's magic when it has a trusted
/// one, else the first 32 bytes.
pub fn unknown_description(task: &ScanTask) -> String {
    match task.format.magic.filter(|m| m.is_reliable()) {
        Some(magic) => format!(
            "Magic:[{}] Bytes:[{}] Offset:{}",
            magic.display(),
            hex::encode_upper(magic.bytes),
            magic.offset
        ),
        None => format!("Bytes32:[{}]", hex_preview(&task.data, 32)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamearc::FormatInfo;
    use std::sync::Arc;

    fn session(dir: &Path, config: ScanConfig) -> ScanSession {
        let log = ScanLog::create(dir).unwrap();
        ScanSession::new(config, dir, log, ProgressTracker::new(0, 0, None))
    }

    fn task(data: Vec<u8>, sub_path: &str, extension: &str, depth: u32, session: &ScanSession) -> ScanTask {
        session.admit(Spawn {
            data: Bytes::from(data),
            sub_path: PathBuf::from(sub_path),
            extension: extension.into(),
            depth,
            weight: 0,
        })
    }

    #[test]
    fn test_unknown_is_logged_and_persisted_below_root() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), ScanConfig::default());
        let data: Vec<u8> = (0u8..40).collect();
        let t = task(data.clone(), "pack/blob", ".zzz", 1, &s);

        let outcome = s.dispatch(&t).unwrap();
        assert_eq!(outcome.disposition, Disposition::Unknown);
        assert_eq!(std::fs::read(dir.path().join("pack/blob.zzz")).unwrap(), data);

        s.log.flush();
        let text = std::fs::read_to_string(s.log.path()).unwrap();
        let expected = format!("Bytes32:[{}]", hex::encode_upper(&data[..32]));
        assert!(text.contains("Unknown: pack/blob.zzz"));
        assert!(text.contains(&expected));
    }

    #[test]
    fn test_root_leaf_stays_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), ScanConfig::default());
        let t = task(b"\x89PNG\r\n\x1a\n0000".to_vec(), "logo", ".png", 0, &s);
        assert_eq!(s.dispatch(&t).unwrap().disposition, Disposition::InPlace);
        assert!(!dir.path().join("logo.png").exists());
    }

    #[test]
    fn test_depth_limit_persists_raw() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            max_depth: 2,
            ..ScanConfig::default()
        };
        let s = session(dir.path(), config);
        let t = task(b"deep".to_vec(), "a/b/c", ".bin", 3, &s);
        assert_eq!(s.dispatch(&t).unwrap().disposition, Disposition::DepthLimited);
        assert!(dir.path().join("a/b/c.bin").exists());
    }

    #[test]
    fn test_unsupported_archive() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), ScanConfig::default());
        let mut data = b"RARC".to_vec();
        data.extend_from_slice(&[0u8; 60]);
        let t = task(data, "stage/map", ".arc", 1, &s);
        assert_eq!(t.format.file_type, FileType::Archive);

        let outcome = s.dispatch(&t).unwrap();
        assert_eq!(outcome.disposition, Disposition::Unsupported);
        assert_eq!(std::fs::read(dir.path().join("stage/map.arc")).unwrap(), &t.data[..]);
        s.log.flush();
        let text = std::fs::read_to_string(s.log.path()).unwrap();
        assert!(text.contains("Unsupported: stage/map.arc ~64.00 B"));
        assert!(text.contains("Description: "));
    }

    #[test]
    fn test_unsupported_root_archive_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let s = session(dir.path(), ScanConfig::default());
        let mut data = b"RARC".to_vec();
        data.extend_from_slice(&[0u8; 28]);
        let t = task(data.clone(), "map", ".rarc", 0, &s);

        assert_eq!(s.dispatch(&t).unwrap().disposition, Disposition::Unsupported);
        assert_eq!(std::fs::read(dir.path().join("map.arc")).unwrap(), data);
    }

    #[test]
    fn test_container_failure_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            fail_fast: false,
            ..ScanConfig::default()
        };
        let s = session(dir.path(), config);
        // ALAR header with an unsupported table flag
        let data = b"ALAR\x07\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        let t = task(data.clone(), "broken", ".alar", 1, &s);

        let outcome = s.dispatch(&t).unwrap();
        assert_eq!(outcome.disposition, Disposition::Failed);
        assert!(outcome.spawns.is_empty());
        assert_eq!(s.tracker.dispositions().failed, 1);
        assert_eq!(std::fs::read(dir.path().join("broken.alar")).unwrap(), data);

        let strict = session(dir.path(), ScanConfig {
            fail_fast: true,
            ..ScanConfig::default()
        });
        assert!(strict.dispatch(&t).is_err());
    }

    #[test]
    fn test_magic_description() {
        let t = ScanTask {
            data: Bytes::from_static(b"RTDP...."),
            sub_path: PathBuf::from("x"),
            extension: String::new(),
            format: Arc::new(FormatInfo::new("", FileType::Unknown, "RTDP").with_magic(b"RTDP", 0)),
            depth: 1,
        };
        assert_eq!(unknown_description(&t), "Magic:[RTDP] Bytes:[52544450] Offset:0");
    }
}
