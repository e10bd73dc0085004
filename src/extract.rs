//! Mutation extraction state machine.
//!
//! Implements the parser's [`CommitLogReadHandler`]: classifies each
//! partition update, filters to the supported event set, deserializes the
//! primary key, and pushes the resulting [`Mutation`]s through the blocking
//! delivery loop. All awaiting happens inline on the reader worker, which
//! is what keeps per-segment delivery in order and provides backpressure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use tracing::{debug, error, info, warn};

use crate::cql;
use crate::error::{CdcError, Result};
use crate::metrics::CdcMetrics;
use crate::mutation::{CellData, ClusterContext, Mutation, MutationOp, RowData};
use crate::offset::OffsetStore;
use crate::parser::{
    CommitLogReadHandler, ParseError, PartitionUpdate, RawMutation, RowEntry, SegmentDescriptor,
    Unfiltered, NO_TIMESTAMP,
};
use crate::position::CommitLogPosition;
use crate::segment;
use crate::sender::{MutationSender, SendOutcome};
use crate::shutdown::StopSignal;
use crate::table::TableMetadata;

/// Classification of a partition update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    /// Partition-level deletion where partition key = primary key
    PartitionKeyRowDeletion,
    /// Partition-level deletion on a table with clustering columns
    PartitionAndClusteringKeyRowDeletion,
    /// Row-level modification
    RowLevelModification,
    /// Update on a materialized view
    MaterializedView,
    /// Update on a secondary index
    SecondaryIndex,
    /// Update on a table holding counter data
    Counter,
}

impl PartitionType {
    /// Classify in priority order: table kind first, then deletion shape.
    pub fn classify<M: TableMetadata>(pu: &PartitionUpdate<M>) -> Self {
        let metadata = pu.metadata.as_ref();
        if metadata.is_counter() {
            PartitionType::Counter
        } else if metadata.is_view() {
            PartitionType::MaterializedView
        } else if metadata.is_index() {
            PartitionType::SecondaryIndex
        } else if pu.is_partition_deletion() && !metadata.clustering_columns().is_empty() {
            PartitionType::PartitionAndClusteringKeyRowDeletion
        } else if pu.is_partition_deletion() {
            PartitionType::PartitionKeyRowDeletion
        } else {
            PartitionType::RowLevelModification
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            PartitionType::PartitionKeyRowDeletion | PartitionType::RowLevelModification
        )
    }
}

/// Classification of one entry in a row iterator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    Insert,
    Update,
    Delete,
    /// Deletion of a range of clustering keys; unsupported
    RangeTombstone,
}

impl RowType {
    pub fn classify(unfiltered: &Unfiltered) -> Self {
        match unfiltered {
            Unfiltered::RangeTombstoneMarker => RowType::RangeTombstone,
            Unfiltered::Row(row) => {
                if row.deletion_timestamp > NO_TIMESTAMP {
                    RowType::Delete
                } else if row.liveness_timestamp > NO_TIMESTAMP {
                    RowType::Insert
                } else {
                    RowType::Update
                }
            }
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, RowType::Insert | RowType::Update | RowType::Delete)
    }
}

/// Builds mutation records from parser callbacks and drives the delivery
/// loop.
pub struct MutationExtractor<M: TableMetadata> {
    context: ClusterContext,
    offsets: Arc<OffsetStore>,
    sender: Arc<dyn MutationSender<M>>,
    metrics: Arc<CdcMetrics>,
    retry_cooldown: Duration,
    stop: StopSignal,
}

impl<M: TableMetadata> MutationExtractor<M> {
    pub fn new(
        context: ClusterContext,
        offsets: Arc<OffsetStore>,
        sender: Arc<dyn MutationSender<M>>,
        metrics: Arc<CdcMetrics>,
        retry_cooldown: Duration,
        stop: StopSignal,
    ) -> Self {
        Self {
            context,
            offsets,
            sender,
            metrics,
            retry_cooldown,
            stop,
        }
    }

    async fn process(
        &mut self,
        pu: &PartitionUpdate<M>,
        position: CommitLogPosition,
        extraction_cursor: CommitLogPosition,
        digest: &str,
    ) -> Result<()> {
        let partition_type = PartitionType::classify(pu);
        if !partition_type.is_supported() {
            warn!("Encountered an unsupported partition type {partition_type:?}, skipping...");
            return Ok(());
        }

        match partition_type {
            PartitionType::PartitionKeyRowDeletion => {
                self.handle_partition_deletion(pu, position, extraction_cursor, digest)
                    .await
            }
            PartitionType::RowLevelModification => {
                for unfiltered in &pu.entries {
                    let row_type = RowType::classify(unfiltered);
                    if !row_type.is_supported() {
                        warn!("Encountered an unsupported row type {row_type:?}, skipping...");
                        continue;
                    }
                    let Unfiltered::Row(row) = unfiltered else {
                        continue;
                    };
                    self.handle_row_modification(row, row_type, pu, position, extraction_cursor, digest)
                        .await?;
                }
                Ok(())
            }
            _ => Err(CdcError::schema(format!(
                "unsupported partition type {partition_type:?} should have been skipped"
            ))),
        }
    }

    /// A valid partition-level deletion implies the partition holds a single
    /// row: there are no clustering keys, so the partition key is the whole
    /// primary key.
    async fn handle_partition_deletion(
        &mut self,
        pu: &PartitionUpdate<M>,
        position: CommitLogPosition,
        extraction_cursor: CommitLogPosition,
        digest: &str,
    ) -> Result<()> {
        let mut after = RowData::new();
        self.populate_partition_columns(&mut after, pu)?;
        let mutation = self.make_mutation(
            pu,
            position,
            after,
            pu.partition_deletion,
            digest,
            MutationOp::Delete,
        );
        self.blocking_send(mutation, extraction_cursor).await
    }

    async fn handle_row_modification(
        &mut self,
        row: &RowEntry,
        row_type: RowType,
        pu: &PartitionUpdate<M>,
        position: CommitLogPosition,
        extraction_cursor: CommitLogPosition,
        digest: &str,
    ) -> Result<()> {
        let mut after = RowData::new();
        self.populate_partition_columns(&mut after, pu)?;
        self.populate_clustering_columns(&mut after, row, pu)?;

        let (op, ts_micros) = match row_type {
            RowType::Insert => (MutationOp::Insert, pu.max_timestamp),
            RowType::Update => (MutationOp::Update, pu.max_timestamp),
            RowType::Delete => (MutationOp::Delete, row.deletion_timestamp),
            RowType::RangeTombstone => unreachable!("filtered before dispatch"),
        };

        let mutation = self.make_mutation(pu, position, after, ts_micros, digest, op);
        self.blocking_send(mutation, extraction_cursor).await
    }

    fn populate_partition_columns(
        &self,
        after: &mut RowData,
        pu: &PartitionUpdate<M>,
    ) -> Result<()> {
        let columns = pu.metadata.partition_key_columns();
        let values = cql::decode_partition_key(columns, &pu.partition_key)?;
        if values.len() != columns.len() {
            return Err(CdcError::key_decode(format!(
                "partition key of {} decoded {} of {} components",
                pu.metadata.qualified_name(),
                values.len(),
                columns.len()
            )));
        }
        for (column, value) in columns.iter().zip(values) {
            after.add_cell(CellData::partition(&column.name, value));
        }
        Ok(())
    }

    fn populate_clustering_columns(
        &self,
        after: &mut RowData,
        row: &RowEntry,
        pu: &PartitionUpdate<M>,
    ) -> Result<()> {
        for (i, column) in pu.metadata.clustering_columns().iter().enumerate() {
            let buffer = row.clustering.get(i).ok_or_else(|| {
                CdcError::key_decode(format!(
                    "row of {} misses clustering component {} ({})",
                    pu.metadata.qualified_name(),
                    i,
                    column.name
                ))
            })?;
            let value = column.cql_type.compose(buffer)?;
            after.add_cell(CellData::clustering(&column.name, value));
        }
        Ok(())
    }

    fn make_mutation(
        &self,
        pu: &PartitionUpdate<M>,
        position: CommitLogPosition,
        data: RowData,
        ts_micros: i64,
        digest: &str,
        op: MutationOp,
    ) -> Mutation<M> {
        Mutation {
            position,
            source: self.context.source_info(),
            data,
            ts_micros,
            digest: digest.to_string(),
            op,
            metadata: pu.metadata.clone(),
        }
    }

    /// Send one mutation and wait for the bus acknowledgement, retrying
    /// forever with a fixed cooldown. The offset cursor advances only after
    /// a confirmed publish.
    ///
    /// `extraction_cursor` is the cursor value sampled when the entry
    /// passed the skip filter; records produced from the same entry share
    /// one position, so the fail-fast check compares against that sample
    /// rather than the live cursor.
    async fn blocking_send(
        &mut self,
        mutation: Mutation<M>,
        extraction_cursor: CommitLogPosition,
    ) -> Result<()> {
        if mutation.position <= extraction_cursor {
            return Err(CdcError::invalid_state(format!(
                "mutation at {} is not past the offset cursor {}",
                mutation.position, extraction_cursor
            )));
        }

        debug!(
            "Sending mutation at {} for table {}",
            mutation.position,
            mutation.qualified_table()
        );

        loop {
            match self.process_mutation(&mutation).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    error!(
                        "Failed to publish mutation at {}: {e}",
                        mutation.position
                    );
                    self.metrics.record_sent_error();
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_cooldown) => {}
                        _ = self.stop.cancelled() => {
                            return Err(CdcError::invalid_state(
                                "stopped while retrying publish",
                            ));
                        }
                    }
                }
            }
        }
    }

    async fn process_mutation(&self, mutation: &Mutation<M>) -> Result<()> {
        match self.sender.send(mutation).await? {
            SendOutcome::Skipped => Ok(()),
            SendOutcome::Published => {
                self.offsets.mark(mutation.position).await?;
                self.metrics.record_sent_mutation();
                info!(
                    "Mutation at {} for table {} sent",
                    mutation.position,
                    mutation.qualified_table()
                );
                Ok(())
            }
        }
    }
}

#[async_trait]
impl<M: TableMetadata> CommitLogReadHandler<M> for MutationExtractor<M> {
    async fn handle_mutation(
        &mut self,
        mutation: &RawMutation<M>,
        _size: i32,
        entry_location: i32,
        descriptor: &SegmentDescriptor,
    ) -> Result<()> {
        if !mutation.tracked_by_cdc {
            return Ok(());
        }

        let segment_id = segment::try_extract_segment_id(&descriptor.file_name)?;
        let entry_position = CommitLogPosition::new(segment_id, entry_location);

        // all records from one entry share its position; sample the cursor
        // once so sibling rows are not mistaken for replays of each other
        let cursor = self.offsets.load();
        if cursor >= entry_position {
            debug!("Mutation at {entry_position} already processed, skipping...");
            return Ok(());
        }

        let digest = hex::encode(Md5::digest(&mutation.wire));
        for pu in &mutation.updates {
            self.process(pu, entry_position, cursor, &digest).await?;
        }
        Ok(())
    }

    fn handle_unrecoverable_error(&mut self, error: &ParseError) {
        error!("Unrecoverable error when reading commit log: {error}");
    }

    fn should_skip_segment_on_error(&mut self, error: &ParseError) -> bool {
        if error.permissible {
            error!("Encountered a permissible error during log replay: {error}");
        } else {
            error!("Encountered a non-permissible error during log replay: {error}");
        }
        false
    }
}
