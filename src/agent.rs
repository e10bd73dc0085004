//! Top-level CDC agent: wires the detector and reader workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   segment paths   ┌──────────────┐
//! │   Detector   │ ────────────────► │    Reader    │
//! │ (dir watcher)│   bounded queue   │ (one at a    │
//! └──────┬───────┘                   │    time)     │
//!        │ recycle                   └──────┬───────┘
//!        ▼                                  │ callbacks
//! ┌──────────────┐                   ┌──────▼───────┐
//! │   Transfer   │ ◄──────────────── │  Extractor   │
//! │ archive/error│  success/failure  │ + delivery   │
//! └──────────────┘                   └──────┬───────┘
//!                                           │ send + ack
//!                                           ▼
//!                                    ┌──────────────┐
//!                                    │  Publisher   │──► per-table topics
//!                                    └──────┬───────┘
//!                                           │ confirmed
//!                                           ▼
//!                                      Offset Store
//! ```
//!
//! Both workers run as spawned tasks over a shared [`StopSignal`]; they
//! share nothing else but the bounded segment queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ProducerConfig;
use crate::detector::CommitLogDetector;
use crate::error::Result;
use crate::extract::MutationExtractor;
use crate::metrics::CdcMetrics;
use crate::mutation::ClusterContext;
use crate::offset::OffsetStore;
use crate::parser::CommitLogParser;
use crate::reader::{segment_queue, CommitLogReader, SEGMENT_QUEUE_CAPACITY};
use crate::sender::MutationSender;
use crate::shutdown::StopSignal;
use crate::table::TableMetadata;
use crate::transfer::{ArchiveCommitLogTransfer, CommitLogTransfer};

/// Commit-log CDC producer.
pub struct CdcAgent<M: TableMetadata> {
    config: ProducerConfig,
    context: ClusterContext,
    parser: Arc<dyn CommitLogParser<M>>,
    sender: Arc<dyn MutationSender<M>>,
    offsets: Arc<OffsetStore>,
    metrics: Arc<CdcMetrics>,
    transfer: Arc<dyn CommitLogTransfer>,
    stop: StopSignal,
    running: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<M: TableMetadata> CdcAgent<M> {
    pub fn new(
        config: ProducerConfig,
        context: ClusterContext,
        parser: Arc<dyn CommitLogParser<M>>,
        sender: Arc<dyn MutationSender<M>>,
        offsets: Arc<OffsetStore>,
        metrics: Arc<CdcMetrics>,
    ) -> Self {
        let transfer = Arc::new(ArchiveCommitLogTransfer::new(config.clone()));
        Self {
            config,
            context,
            parser,
            sender,
            offsets,
            metrics,
            transfer,
            stop: StopSignal::new(),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        }
    }

    /// Replace the default archiving transfer policy.
    pub fn with_transfer(mut self, transfer: Arc<dyn CommitLogTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn metrics(&self) -> &Arc<CdcMetrics> {
        &self.metrics
    }

    pub fn offsets(&self) -> &Arc<OffsetStore> {
        &self.offsets
    }

    /// Validate configuration, create the working directories, and spawn
    /// the detector and reader workers.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Ignoring start signal: agent is already started");
            return Ok(());
        }
        self.config.validate()?;

        tokio::fs::create_dir_all(&self.config.cdc_dir).await?;
        tokio::fs::create_dir_all(self.config.archive_dir()).await?;
        tokio::fs::create_dir_all(self.config.error_dir()).await?;

        info!(
            "Starting CDC agent over {} (near_real_time={})",
            self.config.cdc_dir.display(),
            self.config.near_real_time_cdc
        );

        self.stop = StopSignal::new();
        let (queue, rx) = segment_queue(SEGMENT_QUEUE_CAPACITY);

        let extractor = MutationExtractor::new(
            self.context.clone(),
            self.offsets.clone(),
            self.sender.clone(),
            self.metrics.clone(),
            self.config.retry_cooldown,
            self.stop.clone(),
        );
        let reader = CommitLogReader::new(
            self.parser.clone(),
            Box::new(extractor),
            self.transfer.clone(),
            rx,
            self.config.cdc_dir.clone(),
            self.stop.clone(),
        );
        let detector = CommitLogDetector::new(
            self.config.clone(),
            self.offsets.clone(),
            queue,
            self.transfer.clone(),
            self.stop.clone(),
        );

        self.tasks.push(tokio::spawn(reader.run()));
        self.tasks.push(tokio::spawn(detector.run()));
        Ok(())
    }

    /// Signal stop, wait for both workers to exit, and close the publisher.
    ///
    /// An in-flight send is allowed to finish; a worker parked in the retry
    /// sleep exits without marking the offset, so the mutation is re-emitted
    /// on the next start.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping CDC agent");
        self.stop.stop();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Worker task ended abnormally: {e}");
            }
        }
        self.sender.close().await;
        info!("Stopped CDC agent");
    }

    /// True while both workers are alive.
    pub fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.tasks.iter().all(|t| !t.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::MemoryOffsetBackend;
    use crate::parser::{CommitLogReadHandler, ParseError};
    use crate::sender::MemoryMutationSender;
    use crate::table::TableSpec;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::tempdir;
    use uuid::Uuid;

    struct IdleParser;

    #[async_trait]
    impl CommitLogParser<TableSpec> for IdleParser {
        async fn read_segment(
            &self,
            _path: &Path,
            _handler: &mut (dyn CommitLogReadHandler<TableSpec> + Send),
        ) -> std::result::Result<(), ParseError> {
            Ok(())
        }
    }

    async fn agent(dir: &Path) -> CdcAgent<TableSpec> {
        let config = ProducerConfig::new(dir.join("cdc_raw"), dir.join("cdc"))
            .with_poll_interval_ms(5);
        let metrics = Arc::new(CdcMetrics::new());
        let offsets = Arc::new(
            OffsetStore::open(Arc::new(MemoryOffsetBackend::new()))
                .await
                .unwrap(),
        );
        CdcAgent::new(
            config,
            ClusterContext::new("cluster", Uuid::from_u128(1)),
            Arc::new(IdleParser),
            Arc::new(MemoryMutationSender::new(metrics.clone())),
            offsets,
            metrics,
        )
    }

    #[tokio::test]
    async fn test_start_creates_directories_and_stop_joins_workers() {
        let dir = tempdir().unwrap();
        let mut agent = agent(dir.path()).await;

        assert!(!agent.is_healthy());
        agent.start().await.unwrap();
        assert!(agent.is_healthy());
        assert!(dir.path().join("cdc_raw").is_dir());
        assert!(dir.path().join("cdc/archives").is_dir());
        assert!(dir.path().join("cdc/errors").is_dir());

        agent.stop().await;
        assert!(!agent.is_healthy());
        assert!(agent.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let dir = tempdir().unwrap();
        let mut agent = agent(dir.path()).await;
        agent.start().await.unwrap();
        agent.start().await.unwrap();
        assert_eq!(agent.tasks.len(), 2);
        agent.stop().await;
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = tempdir().unwrap();
        let mut agent = agent(dir.path()).await;
        agent.start().await.unwrap();
        agent.stop().await;
        agent.start().await.unwrap();
        assert!(agent.is_healthy());
        agent.stop().await;
    }
}
