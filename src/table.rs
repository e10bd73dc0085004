//! Table metadata capability.
//!
//! The extractor and publisher need only a narrow slice of what the
//! database knows about a table: identity, kind flags, and the primary-key
//! column layout. Parser bindings for each database major version implement
//! [`TableMetadata`]; [`TableSpec`] is a ready-made implementation used by
//! fixtures and embedders that construct metadata by hand.

use serde::{Deserialize, Serialize};

use crate::cql::CqlType;

/// A primary-key column: name and CQL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub cql_type: CqlType,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, cql_type: CqlType) -> Self {
        Self {
            name: name.into(),
            cql_type,
        }
    }
}

/// Narrow capability over the database's table metadata handle.
pub trait TableMetadata: Send + Sync + 'static {
    fn keyspace(&self) -> &str;

    fn table(&self) -> &str;

    /// Table holds counter columns.
    fn is_counter(&self) -> bool;

    /// Table is a materialized view.
    fn is_view(&self) -> bool;

    /// Table backs a secondary index.
    fn is_index(&self) -> bool;

    /// Partition-key columns, in key order.
    fn partition_key_columns(&self) -> &[ColumnMeta];

    /// Clustering columns, in key order.
    fn clustering_columns(&self) -> &[ColumnMeta];

    /// Fully qualified `keyspace.table` name.
    fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace(), self.table())
    }

    /// Partition-key columns followed by clustering columns.
    fn primary_key_columns(&self) -> Vec<&ColumnMeta> {
        self.partition_key_columns()
            .iter()
            .chain(self.clustering_columns().iter())
            .collect()
    }
}

/// Plain-struct [`TableMetadata`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub keyspace: String,
    pub table: String,
    pub partition_key: Vec<ColumnMeta>,
    pub clustering_key: Vec<ColumnMeta>,
    pub counter: bool,
    pub view: bool,
    pub index: bool,
}

impl TableSpec {
    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition_key: Vec::new(),
            clustering_key: Vec::new(),
            counter: false,
            view: false,
            index: false,
        }
    }

    pub fn with_partition_column(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.partition_key.push(ColumnMeta::new(name, cql_type));
        self
    }

    pub fn with_clustering_column(mut self, name: impl Into<String>, cql_type: CqlType) -> Self {
        self.clustering_key.push(ColumnMeta::new(name, cql_type));
        self
    }

    pub fn as_counter(mut self) -> Self {
        self.counter = true;
        self
    }

    pub fn as_view(mut self) -> Self {
        self.view = true;
        self
    }

    pub fn as_index(mut self) -> Self {
        self.index = true;
        self
    }
}

impl TableMetadata for TableSpec {
    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn is_counter(&self) -> bool {
        self.counter
    }

    fn is_view(&self) -> bool {
        self.view
    }

    fn is_index(&self) -> bool {
        self.index
    }

    fn partition_key_columns(&self) -> &[ColumnMeta] {
        &self.partition_key
    }

    fn clustering_columns(&self) -> &[ColumnMeta] {
        &self.clustering_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_order() {
        let spec = TableSpec::new("ks", "t")
            .with_partition_column("tenant", CqlType::Text)
            .with_partition_column("bucket", CqlType::Int)
            .with_clustering_column("seq", CqlType::BigInt);

        let names: Vec<&str> = spec
            .primary_key_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["tenant", "bucket", "seq"]);
        assert_eq!(spec.qualified_name(), "ks.t");
    }

    #[test]
    fn test_kind_flags() {
        assert!(TableSpec::new("ks", "t").as_counter().is_counter());
        assert!(TableSpec::new("ks", "t").as_view().is_view());
        assert!(TableSpec::new("ks", "t").as_index().is_index());
        let plain = TableSpec::new("ks", "t");
        assert!(!plain.is_counter() && !plain.is_view() && !plain.is_index());
    }
}
