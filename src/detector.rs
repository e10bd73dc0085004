//! Commit-log detector worker.
//!
//! Detects commit-log segments in the CDC directory and feeds them to the
//! reader. On first tick it performs a backlog pass over everything already
//! on disk; afterwards it relies on the directory watcher. The database
//! emits segments in increasing order, so steady-state arrivals are
//! submitted as observed and the reader's one-segment-at-a-time loop keeps
//! global order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::ProducerConfig;
use crate::offset::OffsetStore;
use crate::reader::SegmentQueue;
use crate::segment::{self, INDEX_SUFFIX, LOG_SUFFIX};
use crate::shutdown::StopSignal;
use crate::transfer::CommitLogTransfer;
use crate::watcher::DirectoryWatcher;

/// Worker that discovers segments and hands them to the reader.
pub struct CommitLogDetector {
    config: ProducerConfig,
    offsets: Arc<OffsetStore>,
    queue: SegmentQueue,
    transfer: Arc<dyn CommitLogTransfer>,
    watcher: DirectoryWatcher,
    initial: bool,
    stop: StopSignal,
}

impl CommitLogDetector {
    pub fn new(
        config: ProducerConfig,
        offsets: Arc<OffsetStore>,
        queue: SegmentQueue,
        transfer: Arc<dyn CommitLogTransfer>,
        stop: StopSignal,
    ) -> Self {
        let watcher = DirectoryWatcher::new(
            &config.cdc_dir,
            Duration::from_millis(config.cdc_dir_poll_interval_ms),
        );
        Self {
            config,
            offsets,
            queue,
            transfer,
            watcher,
            initial: true,
            stop,
        }
    }

    /// Loop: recycle errored segments if enabled, run the one-time backlog
    /// pass, then poll the watcher.
    pub async fn run(mut self) {
        info!(
            "Started commit log detector over {}",
            self.config.cdc_dir.display()
        );
        while !self.stop.is_stopped() {
            if self.config.error_commitlog_reprocess_enabled {
                debug!(
                    "Moving back error commitlogs for reprocessing into {}",
                    self.config.cdc_dir.display()
                );
                if let Err(e) = self
                    .transfer
                    .recycle_error_commit_log_files(&self.config.cdc_dir)
                {
                    warn!("Error commit log recycling failed: {e}");
                }
            }

            if self.initial {
                if !self.backlog_scan().await {
                    break;
                }
                self.initial = false;
            }

            let events = tokio::select! {
                _ = self.stop.cancelled() => break,
                events = self.watcher.poll() => events,
            };
            for event in events {
                let Some(name) = event.path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if self.matches_mode(name) && !self.queue.submit(event.path).await {
                    info!("Reader queue closed, stopping detector");
                    return;
                }
            }
        }
        info!("Stopped commit log detector");
    }

    /// Submit existing segments in segment-id order, skipping `.log` files
    /// already covered by the offset cursor. In near-real-time mode the
    /// youngest index sidecar goes last to re-seed the in-segment read
    /// position.
    async fn backlog_scan(&mut self) -> bool {
        // prime the watcher snapshot so the first poll only reports files
        // that arrived after this pass
        self.watcher.scan();
        let mut files = segment::list_commit_logs(&self.config.cdc_dir);
        files.sort_by(|a, b| segment::compare_commit_logs(&name_of(a), &name_of(b)));
        debug!(
            "Reading {} existing commit log files in {}",
            files.len(),
            self.config.cdc_dir.display()
        );

        let cursor_segment = self.offsets.load().segment_id;
        let mut youngest_index: Option<(u64, std::path::PathBuf)> = None;

        for file in files {
            let name = name_of(&file);
            let Some(segment_id) = segment::extract_segment_id(&name) else {
                continue;
            };
            if name.ends_with(LOG_SUFFIX) {
                // filter out already processed segments
                if segment_id >= cursor_segment && !self.queue.submit(file).await {
                    return false;
                }
            } else if name.ends_with(INDEX_SUFFIX)
                && self.config.near_real_time_cdc
                && youngest_index
                    .as_ref()
                    .is_none_or(|(youngest, _)| segment_id > *youngest)
            {
                youngest_index = Some((segment_id, file));
            }
        }

        if let Some((segment_id, index)) = youngest_index {
            debug!("Seeding last synced position from segment {segment_id}");
            if !self.queue.submit(index).await {
                return false;
            }
        }
        true
    }

    fn matches_mode(&self, name: &str) -> bool {
        if !segment::is_commit_log(name) {
            return false;
        }
        if self.config.near_real_time_cdc {
            name.ends_with(INDEX_SUFFIX)
        } else {
            name.ends_with(LOG_SUFFIX)
        }
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::MemoryOffsetBackend;
    use crate::position::CommitLogPosition;
    use crate::reader::segment_queue;
    use crate::transfer::ArchiveCommitLogTransfer;
    use std::path::PathBuf;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    async fn drain(rx: &mut mpsc::Receiver<PathBuf>) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(path) = rx.try_recv() {
            names.push(name_of(&path));
        }
        names
    }

    async fn fixture(
        near_real_time: bool,
        offset: CommitLogPosition,
    ) -> (
        tempfile::TempDir,
        ProducerConfig,
        CommitLogDetector,
        mpsc::Receiver<PathBuf>,
        StopSignal,
    ) {
        let dir = tempdir().unwrap();
        let config = ProducerConfig::new(dir.path().join("cdc_raw"), dir.path().join("cdc"))
            .with_poll_interval_ms(5)
            .with_near_real_time_cdc(near_real_time);
        std::fs::create_dir_all(&config.cdc_dir).unwrap();

        let offsets = Arc::new(
            OffsetStore::open(Arc::new(MemoryOffsetBackend::new()))
                .await
                .unwrap(),
        );
        offsets.mark(offset).await.unwrap();

        let (queue, rx) = segment_queue(64);
        let stop = StopSignal::new();
        let detector = CommitLogDetector::new(
            config.clone(),
            offsets,
            queue,
            Arc::new(ArchiveCommitLogTransfer::new(config.clone())),
            stop.clone(),
        );
        (dir, config, detector, rx, stop)
    }

    #[tokio::test]
    async fn test_backlog_sorted_and_filtered_by_offset() {
        let (_dir, config, mut detector, mut rx, _stop) =
            fixture(false, CommitLogPosition::new(2, 0)).await;
        for name in ["CommitLog-7-3.log", "CommitLog-7-1.log", "CommitLog-7-2.log"] {
            std::fs::write(config.cdc_dir.join(name), b"x").unwrap();
        }

        assert!(detector.backlog_scan().await);
        assert_eq!(
            drain(&mut rx).await,
            vec!["CommitLog-7-2.log", "CommitLog-7-3.log"]
        );
    }

    #[tokio::test]
    async fn test_backlog_ignores_index_in_batch_mode() {
        let (_dir, config, mut detector, mut rx, _stop) =
            fixture(false, CommitLogPosition::default()).await;
        std::fs::write(config.cdc_dir.join("CommitLog-7-1.log"), b"x").unwrap();
        std::fs::write(config.cdc_dir.join("1_cdc.idx"), b"0").unwrap();

        assert!(detector.backlog_scan().await);
        assert_eq!(drain(&mut rx).await, vec!["CommitLog-7-1.log"]);
    }

    #[tokio::test]
    async fn test_backlog_seeds_youngest_index_last_in_near_real_time() {
        let (_dir, config, mut detector, mut rx, _stop) =
            fixture(true, CommitLogPosition::default()).await;
        for name in [
            "CommitLog-7-1.log",
            "CommitLog-7-2.log",
            "1_cdc.idx",
            "2_cdc.idx",
        ] {
            std::fs::write(config.cdc_dir.join(name), b"0").unwrap();
        }

        assert!(detector.backlog_scan().await);
        assert_eq!(
            drain(&mut rx).await,
            vec!["CommitLog-7-1.log", "CommitLog-7-2.log", "2_cdc.idx"]
        );
    }

    #[tokio::test]
    async fn test_backlog_on_empty_directory() {
        let (_dir, _config, mut detector, mut rx, _stop) =
            fixture(false, CommitLogPosition::default()).await;
        assert!(detector.backlog_scan().await);
        assert!(drain(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_steady_state_submits_matching_files() {
        let (_dir, config, detector, mut rx, stop) =
            fixture(false, CommitLogPosition::default()).await;
        let handle = tokio::spawn(detector.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(config.cdc_dir.join("CommitLog-7-5.log"), b"x").unwrap();
        std::fs::write(config.cdc_dir.join("5_cdc.idx"), b"0").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.stop();
        handle.await.unwrap();

        let names = drain(&mut rx).await;
        assert!(names.contains(&"CommitLog-7-5.log".to_string()));
        // index files are not submitted in batch mode
        assert!(!names.contains(&"5_cdc.idx".to_string()));
    }

    #[tokio::test]
    async fn test_recycles_error_files_when_enabled() {
        let (_dir, mut config, _d, _rx, _s) = fixture(false, CommitLogPosition::default()).await;
        config.error_commitlog_reprocess_enabled = true;
        std::fs::create_dir_all(config.error_dir()).unwrap();
        std::fs::write(config.error_dir().join("CommitLog-7-9.log"), b"x").unwrap();

        let offsets = Arc::new(
            OffsetStore::open(Arc::new(MemoryOffsetBackend::new()))
                .await
                .unwrap(),
        );
        let (queue, mut rx) = segment_queue(64);
        let stop = StopSignal::new();
        let detector = CommitLogDetector::new(
            config.clone(),
            offsets,
            queue,
            Arc::new(ArchiveCommitLogTransfer::new(config.clone())),
            stop.clone(),
        );
        let handle = tokio::spawn(detector.run());
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop.stop();
        handle.await.unwrap();

        // recycled back into the CDC directory and rediscovered
        assert!(config.cdc_dir.join("CommitLog-7-9.log").exists());
        assert!(drain(&mut rx)
            .await
            .contains(&"CommitLog-7-9.log".to_string()));
    }
}
