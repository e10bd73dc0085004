//! Commit-log reader worker.
//!
//! Drains an ordered queue of segment paths and drives the external parser
//! against one segment at a time, so mutations are extracted and published
//! in commit-log order. Disposition after each read goes through the
//! [`CommitLogTransfer`] policy.
//!
//! In near-real-time mode the detector submits `<segmentId>_cdc.idx`
//! sidecars. The sidecar's first line is the flushed byte position inside
//! the live segment, optionally followed by a `COMPLETED` marker once the
//! database is done with the segment. Each sidecar advance triggers a
//! re-read of the segment; the offset store suppresses mutations that were
//! already published, and the segment is only transferred once completed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{CdcError, Result};
use crate::parser::{CommitLogParser, CommitLogReadHandler};
use crate::segment::{self, INDEX_SUFFIX};
use crate::shutdown::StopSignal;
use crate::table::TableMetadata;
use crate::transfer::CommitLogTransfer;

/// Marker written into the index sidecar when the segment is final.
const COMPLETED_MARKER: &str = "COMPLETED";

/// Bounded capacity of the detector → reader queue.
pub const SEGMENT_QUEUE_CAPACITY: usize = 256;

/// Sending half of the detector → reader queue.
#[derive(Clone)]
pub struct SegmentQueue {
    tx: mpsc::Sender<PathBuf>,
}

impl SegmentQueue {
    /// Enqueue a segment path, waiting for queue room. Returns `false` when
    /// the reader is gone.
    pub async fn submit(&self, path: PathBuf) -> bool {
        debug!("Submitting {}", path.display());
        self.tx.send(path).await.is_ok()
    }
}

/// Create the bounded segment queue.
pub fn segment_queue(capacity: usize) -> (SegmentQueue, mpsc::Receiver<PathBuf>) {
    let (tx, rx) = mpsc::channel(capacity);
    (SegmentQueue { tx }, rx)
}

/// Flushed position and completion flag read from an index sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexState {
    pub offset: u64,
    pub completed: bool,
}

/// Parse the contents of a `<segmentId>_cdc.idx` sidecar.
pub fn parse_index_file(contents: &str) -> Result<IndexState> {
    let mut lines = contents.lines();
    let offset = lines
        .next()
        .unwrap_or("")
        .trim()
        .parse::<u64>()
        .map_err(|e| CdcError::serialization(format!("invalid index offset: {e}")))?;
    let completed = lines
        .next()
        .map(|line| line.trim() == COMPLETED_MARKER)
        .unwrap_or(false);
    Ok(IndexState { offset, completed })
}

/// Worker that reads queued segments one at a time.
pub struct CommitLogReader<M: TableMetadata> {
    parser: Arc<dyn CommitLogParser<M>>,
    handler: Box<dyn CommitLogReadHandler<M> + Send>,
    transfer: Arc<dyn CommitLogTransfer>,
    queue: mpsc::Receiver<PathBuf>,
    cdc_dir: PathBuf,
    /// Last flushed position seen per live segment
    synced: HashMap<u64, u64>,
    stop: StopSignal,
}

impl<M: TableMetadata> CommitLogReader<M> {
    pub fn new(
        parser: Arc<dyn CommitLogParser<M>>,
        handler: Box<dyn CommitLogReadHandler<M> + Send>,
        transfer: Arc<dyn CommitLogTransfer>,
        queue: mpsc::Receiver<PathBuf>,
        cdc_dir: impl Into<PathBuf>,
        stop: StopSignal,
    ) -> Self {
        Self {
            parser,
            handler,
            transfer,
            queue,
            cdc_dir: cdc_dir.into(),
            synced: HashMap::new(),
            stop,
        }
    }

    /// Drain the queue until stopped or the detector goes away.
    pub async fn run(mut self) {
        info!("Started commit log reader");
        loop {
            if self.stop.is_stopped() {
                break;
            }
            let next = tokio::select! {
                _ = self.stop.cancelled() => break,
                next = self.queue.recv() => next,
            };
            match next {
                Some(path) => self.process(&path).await,
                None => break,
            }
        }
        info!("Stopped commit log reader");
    }

    async fn process(&mut self, path: &Path) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Ignoring path without a file name: {}", path.display());
            return;
        };
        if !path.exists() {
            debug!("Segment {} no longer exists, skipping", path.display());
            return;
        }
        if name.ends_with(INDEX_SUFFIX) {
            self.process_index(path, name).await;
        } else {
            self.process_segment(path, true).await;
        }
    }

    async fn process_index(&mut self, idx_path: &Path, idx_name: &str) {
        let Some(segment_id) = segment::extract_segment_id(idx_name) else {
            warn!("Ignoring malformed index file name {idx_name}");
            return;
        };
        let contents = match tokio::fs::read_to_string(idx_path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Cannot read index {}: {e}", idx_path.display());
                return;
            }
        };
        let state = match parse_index_file(&contents) {
            Ok(state) => state,
            Err(e) => {
                warn!("Cannot parse index {}: {e}", idx_path.display());
                return;
            }
        };

        let last_synced = self.synced.get(&segment_id).copied().unwrap_or(0);
        if state.offset <= last_synced && !state.completed {
            debug!(
                "Index for segment {segment_id} did not advance ({} <= {last_synced})",
                state.offset
            );
            return;
        }
        self.synced.insert(segment_id, state.offset);

        let Some(log_path) = self.find_segment(segment_id) else {
            warn!("No commit log segment found for index {idx_name}");
            return;
        };

        debug!(
            "Index for segment {segment_id} advanced to {} (completed={})",
            state.offset, state.completed
        );
        self.process_segment(&log_path, state.completed).await;

        if state.completed {
            self.synced.remove(&segment_id);
            if let Err(e) = std::fs::remove_file(idx_path) {
                warn!("Cannot remove index {}: {e}", idx_path.display());
            }
        }
    }

    /// Drive the parser over one segment. `finished` is false for a live
    /// segment still being appended to; such a read leaves the file in
    /// place for the next index advance.
    async fn process_segment(&mut self, path: &Path, finished: bool) {
        info!("Processing commit log {}", path.display());
        match self.parser.read_segment(path, self.handler.as_mut()).await {
            Ok(()) => {
                if finished {
                    if let Err(e) = self.transfer.on_success_transfer(path) {
                        warn!("Cannot transfer {}: {e}", path.display());
                    }
                }
            }
            Err(error) if error.permissible => {
                // recoverable for this segment; keep whatever was extracted
                warn!(
                    "Permissible error while reading {}: {error}",
                    path.display()
                );
                if finished {
                    if let Err(e) = self.transfer.on_success_transfer(path) {
                        warn!("Cannot transfer {}: {e}", path.display());
                    }
                }
            }
            Err(error) => {
                self.handler.handle_unrecoverable_error(&error);
                if let Err(e) = self.transfer.on_error_transfer(path) {
                    warn!("Cannot transfer {} to errors: {e}", path.display());
                }
            }
        }
    }

    fn find_segment(&self, segment_id: u64) -> Option<PathBuf> {
        segment::list_commit_logs(&self.cdc_dir)
            .into_iter()
            .find(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| {
                        name.ends_with(".log") && segment::extract_segment_id(name) == Some(segment_id)
                    })
            })
    }
}
