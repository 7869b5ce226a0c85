//! Recursive traversal scheduler.
//!
//! Input files are listed once up front, then a fixed set of workers on a
//! `rayon` pool pulls jobs from a [`WorkQueue`]. A job that expands pushes
//! its children and moves on; nobody waits for a subtree. Each job owns a
//! [`Node`] of a completion tree, and the last descendant to finish settles
//! its ancestors, which is when their byte credit is corrected and files are
//! counted as processed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::dispatch::ScanSession;
use crate::error::ScanError;
use crate::progress::{Disposition, ProgressTracker, ScanResults};
use crate::queue::{Lane, WorkQueue};
use crate::scan_log::ScanLog;
use crate::task::Spawn;
use crate::util::{size_suffix, split_extension};

/// One input file found under the scan root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the scan root, extension included.
    pub relative: PathBuf,
    pub len: u64,
}

#[derive(Debug, Default)]
pub struct FileListing {
    pub files: Vec<SourceFile>,
    pub total_bytes: u64,
}

/// List every file under `root` (or `root` itself when it is a file).
/// Subdirectories are listed before the files next to them.
pub fn collect_files(root: &Path) -> Result<FileListing> {
    let base = if root.is_file() {
        root.parent().unwrap_or(Path::new(""))
    } else {
        root
    };

    let mut listing = FileListing::default();
    let walker = WalkDir::new(root).sort_by(|a, b| {
        b.file_type()
            .is_dir()
            .cmp(&a.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let len = entry
            .metadata()
            .with_context(|| format!("Failed to stat {}", entry.path().display()))?
            .len();
        let relative = entry
            .path()
            .strip_prefix(base)
            .unwrap_or(entry.path())
            .to_path_buf();
        listing.total_bytes += len;
        listing.files.push(SourceFile {
            path: entry.path().to_path_buf(),
            relative,
            len,
        });
    }
    Ok(listing)
}

#[derive(Debug, Clone, Copy)]
enum NodeKind {
    File { len: u64 },
    Member { weight: u64 },
}

/// Completion-tree node. `pending` counts the job itself plus every child
/// that has not settled yet.
#[derive(Debug)]
struct Node {
    pending: AtomicUsize,
    claimed: AtomicU64,
    kind: NodeKind,
    parent: Option<Arc<Node>>,
}

impl Node {
    fn new(kind: NodeKind, parent: Option<Arc<Node>>) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicUsize::new(1),
            claimed: AtomicU64::new(0),
            kind,
            parent,
        })
    }
}

/// Release one pending count on `node`; whoever releases the last one settles
/// the node and continues with its parent.
fn settle(node: Arc<Node>, tracker: &ProgressTracker) {
    let mut current = Some(node);
    while let Some(node) = current {
        if node.pending.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let claimed = node.claimed.load(Ordering::Acquire);
        match node.kind {
            NodeKind::File { len } => tracker.file_settled(len, claimed),
            NodeKind::Member { weight } => tracker.member_settled(weight, claimed),
        }
        current = node.parent.clone();
    }
}

enum Job {
    /// Read lazily by the worker that picks it up.
    File(SourceFile),
    Member(Spawn),
}

struct Scheduler<'a> {
    session: &'a ScanSession,
    queue: WorkQueue<(Job, Arc<Node>)>,
    tasks_processed: AtomicU64,
    failure: Mutex<Option<anyhow::Error>>,
}

impl Scheduler<'_> {
    fn worker(&self) {
        while let Some(((job, node), lane)) = self.queue.next() {
            if self.session.config.cancel.is_cancelled() {
                let dropped = self.queue.close();
                debug!("Cancelled with {} queued job(s)", dropped + 1);
                self.queue.done(lane);
                break;
            }
            self.run(job, node);
            self.queue.done(lane);
        }
    }

    fn run(&self, job: Job, node: Arc<Node>) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        let spawn = match job {
            Job::Member(spawn) => spawn,
            Job::File(source) => match read_source(&source) {
                Ok(spawn) => spawn,
                Err(e) => {
                    let shown = source.relative.display().to_string();
                    self.session.log.log_exception(&e, &shown);
                    self.session.tracker.record(Disposition::Failed);
                    if self.session.config.fail_fast {
                        self.fail(e);
                    }
                    settle(node, &self.session.tracker);
                    return;
                }
            },
        };

        let task = self.session.admit(spawn);
        match self.session.dispatch(&task) {
            Ok(outcome) => self.push_children(&node, outcome.spawns),
            Err(e) => self.fail(e),
        }
        drop(task);
        settle(node, &self.session.tracker);
    }

    fn push_children(&self, node: &Arc<Node>, spawns: Vec<Spawn>) {
        if spawns.is_empty() {
            return;
        }
        let weights: u64 = spawns.iter().map(|s| s.weight).sum();
        node.pending.fetch_add(spawns.len(), Ordering::AcqRel);
        node.claimed.fetch_add(weights, Ordering::AcqRel);

        // reversed so the stack hands out the first member first
        let mut rejected = 0;
        for spawn in spawns.into_iter().rev() {
            let child = Node::new(NodeKind::Member { weight: spawn.weight }, Some(Arc::clone(node)));
            if !self.queue.push((Job::Member(spawn), child), Lane::Member) {
                rejected += 1;
            }
        }
        if rejected > 0 {
            node.pending.fetch_sub(rejected, Ordering::AcqRel);
        }
    }

    fn fail(&self, error: anyhow::Error) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            warn!("Stopping scan: {:#}", error);
            *slot = Some(error);
        }
        drop(slot);
        self.queue.close();
    }
}

fn read_source(source: &SourceFile) -> Result<Spawn> {
    let data = fs::read(&source.path)
        .with_context(|| format!("Failed to read {}", source.path.display()))?;
    let (sub_path, extension) = split_extension(&source.relative);
    Ok(Spawn {
        weight: data.len() as u64,
        data: data.into(),
        sub_path,
        extension,
        depth: 0,
    })
}

/// Scan everything under `root` and mine it into `destination`.
pub fn scan(root: &Path, destination: &Path, config: ScanConfig) -> Result<ScanResults> {
    if !root.exists() {
        return Err(ScanError::MissingRoot(root.to_path_buf()).into());
    }
    let listing = collect_files(root)?;
    fs::create_dir_all(destination)
        .with_context(|| format!("Failed to create destination {}", destination.display()))?;
    info!(
        "Scanning {} file(s), {} under {}",
        listing.files.len(),
        size_suffix(listing.total_bytes),
        root.display()
    );

    let workers = config.workers();
    let member_workers = config.member_workers();
    let log = ScanLog::create(destination)?;
    let log_path = log.path().to_path_buf();
    let tracker = ProgressTracker::new(
        listing.files.len() as u64,
        listing.total_bytes,
        config.progress.clone(),
    );
    let session = ScanSession::new(config, destination, log, tracker);
    let scheduler = Scheduler {
        session: &session,
        queue: WorkQueue::new(member_workers),
        tasks_processed: AtomicU64::new(0),
        failure: Mutex::new(None),
    };

    session.tracker.start();
    for source in listing.files {
        let node = Node::new(NodeKind::File { len: source.len }, None);
        scheduler.queue.push((Job::File(source), node), Lane::File);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("oremine-worker-{i}"))
        .build()
        .map_err(ScanError::from)
        .context("Failed to create scan thread pool")?;
    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| scheduler.worker());
        }
    });

    session.log.close();
    let cancelled = session.config.cancel.is_cancelled();
    let failure = scheduler.failure.lock().take();
    let last = session.tracker.finish(cancelled || failure.is_some());
    if let Some(error) = failure {
        return Err(error);
    }

    let results = ScanResults {
        total_files: last.total_files,
        processed_files: last.processed_files,
        total_bytes: last.total_bytes,
        processed_bytes: last.processed_bytes,
        log_path: Some(log_path),
        tasks_processed: scheduler.tasks_processed.load(Ordering::Relaxed),
        dispositions: session.tracker.dispositions(),
        recovery: session.recovery.stats.snapshot(),
        cancelled,
    };
    info!(
        "Scan finished: {} task(s), {} persisted, {} unknown, {} failed",
        results.tasks_processed,
        results.dispositions.persisted,
        results.dispositions.unknown,
        results.dispositions.failed
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subdirectories_listed_before_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.bin"), b"12").unwrap();
        fs::create_dir_all(root.join("z/inner")).unwrap();
        fs::write(root.join("z/inner/c.bin"), b"3").unwrap();
        fs::write(root.join("z/b.bin"), b"456").unwrap();

        let listing = collect_files(root).unwrap();
        let names: Vec<_> = listing.files.iter().map(|f| f.relative.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("z/inner/c.bin"),
                PathBuf::from("z/b.bin"),
                PathBuf::from("a.bin")
            ]
        );
        assert_eq!(listing.total_bytes, 6);
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("game.iso");
        fs::write(&file, b"disc").unwrap();
        let listing = collect_files(&file).unwrap();
        assert_eq!(listing.files.len(), 1);
        assert_eq!(listing.files[0].relative, PathBuf::from("game.iso"));
    }

    #[test]
    fn test_settle_walks_up_once() {
        let tracker = ProgressTracker::new(1, 100, None);
        let file = Node::new(NodeKind::File { len: 100 }, None);
        file.pending.fetch_add(2, Ordering::AcqRel);
        file.claimed.fetch_add(70, Ordering::AcqRel);
        let a = Node::new(NodeKind::Member { weight: 30 }, Some(Arc::clone(&file)));
        let b = Node::new(NodeKind::Member { weight: 40 }, Some(Arc::clone(&file)));

        settle(Arc::clone(&file), &tracker);
        assert_eq!(tracker.snapshot().processed_files, 0);
        settle(a, &tracker);
        assert_eq!(tracker.snapshot().processed_bytes, 30);
        settle(b, &tracker);
        let done = tracker.snapshot();
        assert_eq!((done.processed_files, done.processed_bytes), (1, 100));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(&dir.path().join("nope"), dir.path(), ScanConfig::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::MissingRoot(_))));
    }
}
