//! # tidelog - commit-log change data capture producer
//!
//! Tails a wide-column database's CDC commit-log directory, reconstructs
//! ordered row-level mutation events, and publishes each event as a keyed
//! message on a per-table topic of Apache Pulsar. Only the primary key is
//! published; the payload carries a content digest and routing metadata so
//! consumers re-read column values from the source of truth.
//!
//! ## Guarantees
//!
//! - **At-least-once**: every observed mutation is published one or more
//!   times; the offset cursor only advances on a confirmed publish, so
//!   duplicates on restart are accepted by design.
//! - **Ordered per segment**: one reader drives the parser over one segment
//!   at a time and awaits every send inline.
//! - **No reprocessing across restarts**: a durable monotonic
//!   `(segment_id, position)` cursor gates extraction.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "pulsar")]
//! # async fn example() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use tidelog::{
//!     CdcAgent, CdcMetrics, ClusterContext, FileOffsetBackend, OffsetStore, ProducerConfig,
//! };
//!
//! let config = ProducerConfig::new("/var/lib/db/cdc_raw", "/var/lib/tidelog")
//!     .with_topic_prefix("events-")
//!     .with_pulsar_service_url("pulsar://localhost:6650");
//!
//! let metrics = Arc::new(CdcMetrics::new());
//! let offsets = Arc::new(
//!     OffsetStore::open(Arc::new(FileOffsetBackend::new("/var/lib/tidelog/offset.dat"))).await?,
//! );
//! let context = ClusterContext::new("my-cluster", uuid::Uuid::new_v4());
//! # let parser: Arc<dyn tidelog::CommitLogParser<tidelog::TableSpec>> = unimplemented!();
//! let sender = Arc::new(tidelog::PulsarMutationSender::new(
//!     config.clone(),
//!     context.clone(),
//!     metrics.clone(),
//! ));
//!
//! let mut agent = CdcAgent::new(config, context, parser, sender, offsets, metrics);
//! agent.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod cql;
pub mod detector;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod mutation;
pub mod offset;
pub mod parser;
pub mod position;
pub mod reader;
pub mod schema;
pub mod segment;
pub mod sender;
pub mod shutdown;
pub mod table;
pub mod transfer;
pub mod watcher;

// Pulsar-backed publisher - feature-gated
#[cfg(feature = "pulsar")]
pub mod pulsar;

// Re-export the working set at the crate root
pub use agent::CdcAgent;
pub use config::ProducerConfig;
pub use cql::{CqlType, CqlValue};
pub use error::{CdcError, Result};
pub use extract::{MutationExtractor, PartitionType, RowType};
pub use crate::metrics::{CdcMetrics, MetricsSnapshot};
pub use mutation::{
    CellData, CellKind, ClusterContext, Mutation, MutationOp, MutationValue, RowData, SourceInfo,
};
pub use offset::{FileOffsetBackend, MemoryOffsetBackend, OffsetBackend, OffsetStore};
pub use parser::{
    CommitLogParser, CommitLogReadHandler, ParseError, PartitionUpdate, RawMutation, RowEntry,
    SegmentDescriptor, Unfiltered, NO_TIMESTAMP,
};
pub use position::CommitLogPosition;
pub use sender::{MemoryMutationSender, MutationSender, SendOutcome};
pub use shutdown::StopSignal;
pub use table::{ColumnMeta, TableMetadata, TableSpec};
pub use transfer::{ArchiveCommitLogTransfer, CommitLogTransfer, DeletingCommitLogTransfer};

#[cfg(feature = "pulsar")]
pub use crate::pulsar::PulsarMutationSender;
