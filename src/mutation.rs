//! In-memory mutation records and the wire payload.
//!
//! A [`Mutation`] carries the primary key of one changed row plus routing
//! metadata; column values never travel on the bus. Consumers use the
//! [`MutationValue`] digest to coalesce re-reads of the same source
//! mutation and the node id to trace provenance.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cql::CqlValue;
use crate::position::CommitLogPosition;
use crate::table::TableMetadata;

/// Role of a cell inside the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Partition,
    Clustering,
    Regular,
}

/// One primary-key cell of a changed row.
#[derive(Debug, Clone, PartialEq)]
pub struct CellData {
    pub name: String,
    pub value: CqlValue,
    /// Deletion timestamp in microseconds, when the cell was deleted
    pub deletion_ts: Option<i64>,
    pub kind: CellKind,
}

impl CellData {
    pub fn partition(name: impl Into<String>, value: CqlValue) -> Self {
        Self {
            name: name.into(),
            value,
            deletion_ts: None,
            kind: CellKind::Partition,
        }
    }

    pub fn clustering(name: impl Into<String>, value: CqlValue) -> Self {
        Self {
            name: name.into(),
            value,
            deletion_ts: None,
            kind: CellKind::Clustering,
        }
    }
}

/// Ordered cells of a changed row, in primary-key column order.
///
/// Only `Partition` and `Clustering` cells are ever populated; regular
/// columns are intentionally absent because consumers re-read the source
/// of truth.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowData {
    cells: Vec<CellData>,
}

impl RowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cell(&mut self, cell: CellData) {
        self.cells.push(cell);
    }

    pub fn cells(&self) -> &[CellData] {
        &self.cells
    }

    /// Partition and clustering cells, which is everything this producer
    /// ever populates, in primary-key order.
    pub fn primary_key_cells(&self) -> impl Iterator<Item = &CellData> {
        self.cells
            .iter()
            .filter(|c| matches!(c.kind, CellKind::Partition | CellKind::Clustering))
    }

    pub fn get(&self, name: &str) -> Option<&CellData> {
        self.cells.iter().find(|c| c.name == name)
    }
}

/// Where the mutation was observed. Immutable per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub cluster: String,
    pub node: Uuid,
}

/// Ambient process identity, injected instead of read from global database
/// state so tests can stub it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterContext {
    pub cluster_name: String,
    pub node_id: Uuid,
}

impl ClusterContext {
    pub fn new(cluster_name: impl Into<String>, node_id: Uuid) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            node_id,
        }
    }

    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            cluster: self.cluster_name.clone(),
            node: self.node_id,
        }
    }
}

/// Row-level operation carried by a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationOp {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Insert => write!(f, "INSERT"),
            MutationOp::Update => write!(f, "UPDATE"),
            MutationOp::Delete => write!(f, "DELETE"),
        }
    }
}

/// One row-level mutation event, ready for publication.
#[derive(Debug)]
pub struct Mutation<M> {
    pub position: CommitLogPosition,
    pub source: SourceInfo,
    pub data: RowData,
    /// Max cell timestamp for inserts/updates, deletion timestamp for deletes
    pub ts_micros: i64,
    /// MD5 hex of the source mutation's serialized wire form
    pub digest: String,
    pub op: MutationOp,
    pub metadata: Arc<M>,
}

// manual impl: the metadata handle is shared, M itself need not be Clone
impl<M> Clone for Mutation<M> {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            source: self.source.clone(),
            data: self.data.clone(),
            ts_micros: self.ts_micros,
            digest: self.digest.clone(),
            op: self.op,
            metadata: self.metadata.clone(),
        }
    }
}

impl<M: TableMetadata> Mutation<M> {
    /// The wire payload for this mutation.
    pub fn mutation_value(&self) -> MutationValue {
        MutationValue {
            md5_digest: self.digest.clone(),
            node_id: self.source.node.to_string(),
            operation: self.op.to_string(),
        }
    }

    /// Topic-qualified table name, `keyspace.table`.
    pub fn qualified_table(&self) -> String {
        self.metadata.qualified_name()
    }
}

/// Wire payload published per mutation: no column values, just the digest
/// and routing metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationValue {
    #[serde(rename = "md5Digest")]
    pub md5_digest: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub operation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::CqlType;
    use crate::table::TableSpec;

    #[test]
    fn test_row_data_preserves_order() {
        let mut data = RowData::new();
        data.add_cell(CellData::partition("tenant", CqlValue::Text("a".into())));
        data.add_cell(CellData::partition("bucket", CqlValue::Int(3)));
        data.add_cell(CellData::clustering("seq", CqlValue::BigInt(9)));

        let names: Vec<&str> = data.primary_key_cells().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["tenant", "bucket", "seq"]);
        assert_eq!(data.get("bucket").unwrap().value, CqlValue::Int(3));
    }

    #[test]
    fn test_operation_display_is_uppercase() {
        assert_eq!(MutationOp::Insert.to_string(), "INSERT");
        assert_eq!(MutationOp::Update.to_string(), "UPDATE");
        assert_eq!(MutationOp::Delete.to_string(), "DELETE");
    }

    #[test]
    fn test_mutation_value_from_mutation() {
        let metadata = Arc::new(
            TableSpec::new("ks", "t").with_partition_column("id", CqlType::Text),
        );
        let context = ClusterContext::new("cluster-1", Uuid::from_u128(5));
        let mut data = RowData::new();
        data.add_cell(CellData::partition("id", CqlValue::Text("a".into())));

        let mutation = Mutation {
            position: CommitLogPosition::new(42, 100),
            source: context.source_info(),
            data,
            ts_micros: 1_000,
            digest: "abc123".to_string(),
            op: MutationOp::Delete,
            metadata,
        };

        let value = mutation.mutation_value();
        assert_eq!(value.md5_digest, "abc123");
        assert_eq!(value.node_id, Uuid::from_u128(5).to_string());
        assert_eq!(value.operation, "DELETE");
        assert_eq!(mutation.qualified_table(), "ks.t");
    }

    #[test]
    fn test_mutation_value_serde_field_names() {
        let value = MutationValue {
            md5_digest: "d".to_string(),
            node_id: "n".to_string(),
            operation: "INSERT".to_string(),
        };
        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("md5Digest"));
        assert!(json.contains("nodeId"));
        assert!(json.contains("operation"));
    }
}
