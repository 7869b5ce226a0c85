//! Structured scan log.
//!
//! Workers never touch the file: events go over a `flume` channel to one
//! writer thread that owns `Scan_Log_<unix>.log` in the destination. Every
//! event is mirrored to the `log` facade as well.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use log::{info, warn};
use parking_lot::Mutex;

use crate::util::unix_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Unknown,
    Unsupported,
    Exception,
    DepthLimit,
    Recovered,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileAction::Unknown => "Unknown",
            FileAction::Unsupported => "Unsupported",
            FileAction::Exception => "Exception",
            FileAction::DepthLimit => "DepthLimit",
            FileAction::Recovered => "Recovered",
        };
        f.write_str(s)
    }
}

enum LogMessage {
    Line(String),
    Flush(flume::Sender<()>),
    Close,
}

pub struct ScanLog {
    path: PathBuf,
    tx: flume::Sender<LogMessage>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl ScanLog {
    /// Create the log file in `destination` and start the writer thread.
    pub fn create(destination: &Path) -> Result<Self> {
        let path = destination.join(format!("Scan_Log_{}.log", unix_timestamp()));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create scan log: {}", path.display()))?;
        let (tx, rx) = flume::unbounded::<LogMessage>();

        let writer = std::thread::Builder::new()
            .name("oremine-scan-log".into())
            .spawn(move || {
                let mut out = BufWriter::new(file);
                while let Ok(message) = rx.recv() {
                    match message {
                        LogMessage::Line(line) => {
                            if let Err(e) = writeln!(out, "{line}") {
                                warn!("Scan log write failed: {e}");
                            }
                        }
                        LogMessage::Flush(ack) => {
                            let _ = out.flush();
                            let _ = ack.send(());
                        }
                        LogMessage::Close => break,
                    }
                }
                let _ = out.flush();
            })
            .context("Failed to start scan log writer")?;

        Ok(Self {
            path,
            tx,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_event(&self, action: FileAction, path: &str, description: &str) {
        match action {
            FileAction::Exception | FileAction::DepthLimit => warn!("{action}: {path} {description}"),
            _ => info!("{action}: {path} {description}"),
        }
        let line = if description.is_empty() {
            format!("{action}: {path}")
        } else {
            format!("{action}: {path}\n\t{description}")
        };
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_exception(&self, error: &anyhow::Error, path: &str) {
        self.log_event(FileAction::Exception, path, &format!("{error:#}"));
    }

    /// Block until everything sent so far is on disk.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = flume::bounded(1);
        if self.tx.send(LogMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Flush and stop the writer. Later events are dropped.
    pub fn close(&self) {
        let Some(handle) = self.writer.lock().take() else {
            return;
        };
        let _ = self.tx.send(LogMessage::Close);
        if handle.join().is_err() {
            warn!("Scan log writer panicked");
        }
    }
}

impl Drop for ScanLog {
    fn drop(&mut self) {
        self.close();
    }
}
