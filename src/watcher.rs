//! Debounced filesystem-event poller over the CDC directory.
//!
//! Filesystem notifications are inherently best-effort; this watcher polls
//! on a fixed cadence and diffs directory snapshots, reporting at most one
//! event per path per poll. Callers that need stronger guarantees rescan on
//! top of the reported events, which the detector does.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

/// Kind of change observed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Create,
    Modify,
}

/// A single debounced directory event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

/// Poll-based directory watcher.
pub struct DirectoryWatcher {
    dir: PathBuf,
    interval: Duration,
    snapshot: HashMap<PathBuf, FileStamp>,
}

impl DirectoryWatcher {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
            snapshot: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sleep one poll interval, then report what changed since the last poll.
    pub async fn poll(&mut self) -> Vec<WatchEvent> {
        tokio::time::sleep(self.interval).await;
        self.scan()
    }

    /// Diff the directory against the previous snapshot without sleeping.
    ///
    /// Emits `Create` for unseen paths and `Modify` for paths whose mtime or
    /// length changed; at most one event per path. Removed paths are dropped
    /// from the snapshot without an event.
    pub fn scan(&mut self) -> Vec<WatchEvent> {
        let mut current = HashMap::new();
        match std::fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if let Ok(meta) = entry.metadata() {
                        if meta.is_file() {
                            current.insert(
                                path,
                                FileStamp {
                                    modified: meta.modified().ok(),
                                    len: meta.len(),
                                },
                            );
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot scan {}: {e}", self.dir.display()),
        }

        let mut events = Vec::new();
        for (path, stamp) in &current {
            match self.snapshot.get(path) {
                None => events.push(WatchEvent {
                    kind: WatchEventKind::Create,
                    path: path.clone(),
                }),
                Some(previous) if previous != stamp => events.push(WatchEvent {
                    kind: WatchEventKind::Modify,
                    path: path.clone(),
                }),
                Some(_) => {}
            }
        }
        self.snapshot = current;
        events
    }
}
