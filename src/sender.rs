//! Outbound publisher seam.
//!
//! The delivery loop talks to a [`MutationSender`]; the production
//! implementation is the Pulsar-backed sender behind the `pulsar` feature,
//! and [`MemoryMutationSender`] captures sends in memory for tests and
//! embedders.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::metrics::CdcMetrics;
use crate::mutation::Mutation;
use crate::schema;
use crate::table::TableMetadata;

/// What became of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Acknowledged by the bus
    Published,
    /// Dropped for an unsupported primary-key column type; counted as
    /// skipped and completed immediately so the delivery loop moves on
    /// without advancing the offset
    Skipped,
}

/// Publishes one mutation to the per-table topic and resolves when the bus
/// has acknowledged it.
#[async_trait]
pub trait MutationSender<M: TableMetadata>: Send + Sync {
    async fn send(&self, mutation: &Mutation<M>) -> Result<SendOutcome>;

    /// Release bus resources. Idempotent.
    async fn close(&self) {}
}

/// In-memory sender: applies the same supported-key filter as the
/// production sender and records everything it would have published.
pub struct MemoryMutationSender<M> {
    metrics: Arc<CdcMetrics>,
    sent: Mutex<Vec<Mutation<M>>>,
}

impl<M: TableMetadata> MemoryMutationSender<M> {
    pub fn new(metrics: Arc<CdcMetrics>) -> Self {
        Self {
            metrics,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Mutations accepted so far, in send order.
    pub fn sent(&self) -> Vec<Mutation<M>> {
        self.sent.lock().expect("sender lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("sender lock poisoned").len()
    }
}

#[async_trait]
impl<M: TableMetadata> MutationSender<M> for MemoryMutationSender<M> {
    async fn send(&self, mutation: &Mutation<M>) -> Result<SendOutcome> {
        if !schema::is_supported(mutation.metadata.as_ref()) {
            self.metrics.record_skipped_mutation();
            return Ok(SendOutcome::Skipped);
        }
        self.sent
            .lock()
            .expect("sender lock poisoned")
            .push(mutation.clone());
        Ok(SendOutcome::Published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::{CqlType, CqlValue};
    use crate::mutation::{CellData, ClusterContext, MutationOp, RowData};
    use crate::position::CommitLogPosition;
    use crate::table::TableSpec;
    use uuid::Uuid;

    fn mutation_for(table: TableSpec) -> Mutation<TableSpec> {
        let mut data = RowData::new();
        data.add_cell(CellData::partition("id", CqlValue::Text("a".into())));
        Mutation {
            position: CommitLogPosition::new(1, 10),
            source: ClusterContext::new("c", Uuid::from_u128(1)).source_info(),
            data,
            ts_micros: 1,
            digest: "d".into(),
            op: MutationOp::Insert,
            metadata: Arc::new(table),
        }
    }

    #[tokio::test]
    async fn test_memory_sender_accepts_supported() {
        let metrics = Arc::new(CdcMetrics::new());
        let sender = MemoryMutationSender::new(metrics.clone());
        let table = TableSpec::new("ks", "t").with_partition_column("id", CqlType::Text);

        sender.send(&mutation_for(table)).await.unwrap();
        assert_eq!(sender.sent_count(), 1);
        assert_eq!(metrics.skipped_mutations(), 0);
    }

    #[tokio::test]
    async fn test_memory_sender_skips_unsupported_key() {
        let metrics = Arc::new(CdcMetrics::new());
        let sender = MemoryMutationSender::new(metrics.clone());
        let table = TableSpec::new("ks", "t").with_partition_column("id", CqlType::Decimal);

        // completes without error, counted as skipped
        sender.send(&mutation_for(table)).await.unwrap();
        assert_eq!(sender.sent_count(), 0);
        assert_eq!(metrics.skipped_mutations(), 1);
    }
}
