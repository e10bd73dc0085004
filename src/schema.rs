//! AVRO schema derivation and encoding for bus messages.
//!
//! The key schema is derived per table over the primary-key columns only:
//! partition-key columns map to non-null AVRO fields, clustering columns are
//! wrapped in a `union {null, T}`. The value schema is the fixed
//! `MutationValue` record. Uses JSON-based schema definition for
//! compatibility with apache-avro 0.21.

use std::sync::OnceLock;

use apache_avro::types::{Record, Value};
use apache_avro::Schema;
use serde_json::json;
use tracing::warn;

use crate::cql::{CqlType, CqlValue};
use crate::error::{CdcError, Result};
use crate::mutation::{CellKind, MutationValue, RowData};
use crate::table::TableMetadata;

/// Map a CQL primary-key type to its AVRO schema JSON, or `None` when the
/// type has no bus encoding.
pub fn avro_type_json(cql_type: CqlType) -> Option<serde_json::Value> {
    let schema = match cql_type {
        CqlType::Text | CqlType::Ascii => json!("string"),
        CqlType::Boolean => json!("boolean"),
        CqlType::Blob => json!("bytes"),
        // AVRO has no 8/16-bit integers; widen to int
        CqlType::TinyInt | CqlType::SmallInt | CqlType::Int => json!("int"),
        CqlType::BigInt => json!("long"),
        CqlType::Float => json!("float"),
        CqlType::Double => json!("double"),
        // millis since epoch
        CqlType::Timestamp => json!("long"),
        // days since epoch
        CqlType::Date => json!("int"),
        // millis since midnight
        CqlType::Time => json!("int"),
        CqlType::Uuid | CqlType::TimeUuid => json!("string"),
        CqlType::Inet => json!("string"),
        CqlType::Decimal => return None,
    };
    Some(schema)
}

/// Whether every primary-key column of `metadata` has a bus encoding.
pub fn is_supported<M: TableMetadata>(metadata: &M) -> bool {
    for column in metadata.primary_key_columns() {
        if avro_type_json(column.cql_type).is_none() {
            warn!(
                "Unsupported primary key column {}.{} type={}, skipping mutation",
                metadata.qualified_name(),
                column.name,
                column.cql_type
            );
            return false;
        }
    }
    true
}

/// Derive the AVRO key schema for `metadata`: record `<keyspace>.<table>`
/// with fields in primary-key column order.
pub fn derive_key_schema<M: TableMetadata>(metadata: &M) -> Result<Schema> {
    let mut fields = Vec::new();
    for column in metadata.partition_key_columns() {
        let avro_type = avro_type_json(column.cql_type).ok_or_else(|| {
            CdcError::schema(format!(
                "no avro mapping for partition column {} ({})",
                column.name, column.cql_type
            ))
        })?;
        fields.push(json!({"name": column.name, "type": avro_type}));
    }
    for column in metadata.clustering_columns() {
        let avro_type = avro_type_json(column.cql_type).ok_or_else(|| {
            CdcError::schema(format!(
                "no avro mapping for clustering column {} ({})",
                column.name, column.cql_type
            ))
        })?;
        // clustering keys are optional
        fields.push(json!({"name": column.name, "type": ["null", avro_type]}));
    }
    let record = json!({
        "type": "record",
        "name": metadata.table(),
        "namespace": metadata.keyspace(),
        "doc": format!("Primary key schema for table {}", metadata.qualified_name()),
        "fields": fields,
    });
    Ok(Schema::parse(&record)?)
}

/// Convert a decoded CQL value to its AVRO encoding, or `None` when the
/// type has no bus encoding.
pub fn cql_to_avro(value: &CqlValue) -> Option<Value> {
    let avro = match value {
        CqlValue::Text(s) | CqlValue::Ascii(s) => Value::String(s.clone()),
        CqlValue::Boolean(b) => Value::Boolean(*b),
        CqlValue::Blob(b) => Value::Bytes(b.clone()),
        // unsigned promotion: AVRO does not support INT8/INT16
        CqlValue::TinyInt(v) => Value::Int((*v as u8) as i32),
        CqlValue::SmallInt(v) => Value::Int((*v as u16) as i32),
        CqlValue::Int(v) => Value::Int(*v),
        CqlValue::BigInt(v) => Value::Long(*v),
        CqlValue::Float(v) => Value::Float(*v),
        CqlValue::Double(v) => Value::Double(*v),
        CqlValue::Timestamp(millis) => Value::Long(*millis),
        // raw day count is epoch-at-2^31; avro date is days from the unix epoch
        CqlValue::Date(raw) => Value::Int((*raw as i64 + i32::MIN as i64) as i32),
        // avro time is epoch milliseconds
        CqlValue::Time(nanos) => Value::Int((nanos / 1_000_000) as i32),
        CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => Value::String(u.to_string()),
        CqlValue::Inet(addr) => Value::String(addr.to_string()),
        CqlValue::Decimal { .. } => return None,
    };
    Some(avro)
}

/// Build the AVRO key record for a mutation's primary-key cells and
/// serialize it to the binary datum form.
pub fn encode_key(schema: &Schema, data: &RowData) -> Result<Vec<u8>> {
    let mut record = Record::new(schema)
        .ok_or_else(|| CdcError::schema("key schema is not a record schema"))?;
    for cell in data.primary_key_cells() {
        let value = cql_to_avro(&cell.value).ok_or_else(|| {
            CdcError::schema(format!("cell {} has no avro encoding", cell.name))
        })?;
        match cell.kind {
            // clustering fields are union {null, T}; branch 1 is the value
            CellKind::Clustering => record.put(&cell.name, Value::Union(1, Box::new(value))),
            _ => record.put(&cell.name, value),
        }
    }
    Ok(apache_avro::to_avro_datum(schema, record)?)
}

fn mutation_value_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let record = json!({
            "type": "record",
            "name": "MutationValue",
            "fields": [
                {"name": "md5Digest", "type": "string"},
                {"name": "nodeId", "type": "string"},
                {"name": "operation", "type": "string"},
            ],
        });
        Schema::parse(&record).expect("static MutationValue schema is valid")
    })
}

/// JSON definition of the value schema, for schema registration.
pub fn mutation_value_schema_json() -> String {
    mutation_value_schema().canonical_form()
}

/// Serialize a [`MutationValue`] to the binary datum form.
pub fn encode_mutation_value(value: &MutationValue) -> Result<Vec<u8>> {
    let schema = mutation_value_schema();
    let mut record = Record::new(schema)
        .ok_or_else(|| CdcError::schema("value schema is not a record schema"))?;
    record.put("md5Digest", Value::String(value.md5_digest.clone()));
    record.put("nodeId", Value::String(value.node_id.clone()));
    record.put("operation", Value::String(value.operation.clone()));
    Ok(apache_avro::to_avro_datum(schema, record)?)
}

/// Frame key and value schema definitions into the bus's key-value
/// schema-info form: 4-byte big-endian length before each part.
pub fn encode_key_value_schema_info(key_schema_json: &str, value_schema_json: &str) -> Vec<u8> {
    let key = key_schema_json.as_bytes();
    let value = value_schema_json.as_bytes();
    let mut out = Vec::with_capacity(8 + key.len() + value.len());
    out.extend_from_slice(&(key.len() as i32).to_be_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&(value.len() as i32).to_be_bytes());
    out.extend_from_slice(value);
    out
}
