//! CQL primary-key types: wire decoding and composite-key handling.
//!
//! Only the types that can appear in a primary key are modeled. Values use
//! the database's native serialization (big-endian, length-framed by the
//! enclosing buffer), and [`decode_partition_key`] implements the composite
//! key layout:
//!
//! ```text
//! [0xFFFF static prefix]? ( <u16 length> <value bytes> <end-of-component> )*
//! ```
//!
//! The end-of-component byte is `0` for key columns; any other value marks a
//! query-bound encoding and stops the decode.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CdcError, Result};
use crate::table::ColumnMeta;

/// CQL column types supported in primary keys.
///
/// `Decimal` decodes but has no bus encoding; mutations keyed by it are
/// counted as skipped by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CqlType {
    Text,
    Ascii,
    Boolean,
    Blob,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Timestamp,
    Date,
    Time,
    Uuid,
    TimeUuid,
    Inet,
    Decimal,
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CqlType::Text => "text",
            CqlType::Ascii => "ascii",
            CqlType::Boolean => "boolean",
            CqlType::Blob => "blob",
            CqlType::TinyInt => "tinyint",
            CqlType::SmallInt => "smallint",
            CqlType::Int => "int",
            CqlType::BigInt => "bigint",
            CqlType::Float => "float",
            CqlType::Double => "double",
            CqlType::Timestamp => "timestamp",
            CqlType::Date => "date",
            CqlType::Time => "time",
            CqlType::Uuid => "uuid",
            CqlType::TimeUuid => "timeuuid",
            CqlType::Inet => "inet",
            CqlType::Decimal => "decimal",
        };
        f.write_str(name)
    }
}

/// A decoded CQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Text(String),
    Ascii(String),
    Boolean(bool),
    Blob(Vec<u8>),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    /// Raw day count with the epoch at `2^31`
    Date(u32),
    /// Nanoseconds since midnight
    Time(i64),
    Uuid(Uuid),
    TimeUuid(Uuid),
    Inet(IpAddr),
    /// Arbitrary-precision decimal: scale plus two's-complement unscaled bytes
    Decimal { scale: i32, unscaled: Vec<u8> },
}

impl CqlType {
    /// Decode a value of this type from its native serialized form.
    pub fn compose(&self, bytes: &[u8]) -> Result<CqlValue> {
        match self {
            CqlType::Text => Ok(CqlValue::Text(compose_utf8(bytes, "text")?)),
            CqlType::Ascii => Ok(CqlValue::Ascii(compose_utf8(bytes, "ascii")?)),
            CqlType::Boolean => {
                let [b] = fixed::<1>(bytes, "boolean")?;
                Ok(CqlValue::Boolean(b != 0))
            }
            CqlType::Blob => Ok(CqlValue::Blob(bytes.to_vec())),
            CqlType::TinyInt => {
                let [b] = fixed::<1>(bytes, "tinyint")?;
                Ok(CqlValue::TinyInt(b as i8))
            }
            CqlType::SmallInt => Ok(CqlValue::SmallInt(i16::from_be_bytes(fixed::<2>(
                bytes, "smallint",
            )?))),
            CqlType::Int => Ok(CqlValue::Int(i32::from_be_bytes(fixed::<4>(bytes, "int")?))),
            CqlType::BigInt => Ok(CqlValue::BigInt(i64::from_be_bytes(fixed::<8>(
                bytes, "bigint",
            )?))),
            CqlType::Float => Ok(CqlValue::Float(f32::from_be_bytes(fixed::<4>(
                bytes, "float",
            )?))),
            CqlType::Double => Ok(CqlValue::Double(f64::from_be_bytes(fixed::<8>(
                bytes, "double",
            )?))),
            CqlType::Timestamp => Ok(CqlValue::Timestamp(i64::from_be_bytes(fixed::<8>(
                bytes,
                "timestamp",
            )?))),
            CqlType::Date => Ok(CqlValue::Date(u32::from_be_bytes(fixed::<4>(
                bytes, "date",
            )?))),
            CqlType::Time => Ok(CqlValue::Time(i64::from_be_bytes(fixed::<8>(
                bytes, "time",
            )?))),
            CqlType::Uuid => Ok(CqlValue::Uuid(Uuid::from_bytes(fixed::<16>(
                bytes, "uuid",
            )?))),
            CqlType::TimeUuid => Ok(CqlValue::TimeUuid(Uuid::from_bytes(fixed::<16>(
                bytes, "timeuuid",
            )?))),
            CqlType::Inet => match bytes.len() {
                4 => Ok(CqlValue::Inet(IpAddr::from(fixed::<4>(bytes, "inet")?))),
                16 => Ok(CqlValue::Inet(IpAddr::from(fixed::<16>(bytes, "inet")?))),
                n => Err(CdcError::key_decode(format!(
                    "inet value must be 4 or 16 bytes, got {n}"
                ))),
            },
            CqlType::Decimal => {
                if bytes.len() < 4 {
                    return Err(CdcError::key_decode("decimal value shorter than scale"));
                }
                let scale = i32::from_be_bytes(fixed::<4>(&bytes[..4], "decimal")?);
                Ok(CqlValue::Decimal {
                    scale,
                    unscaled: bytes[4..].to_vec(),
                })
            }
        }
    }
}

impl CqlValue {
    /// Serialize back to the native form. Inverse of [`CqlType::compose`].
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            CqlValue::Text(s) | CqlValue::Ascii(s) => s.as_bytes().to_vec(),
            CqlValue::Boolean(b) => vec![*b as u8],
            CqlValue::Blob(b) => b.clone(),
            CqlValue::TinyInt(v) => vec![*v as u8],
            CqlValue::SmallInt(v) => v.to_be_bytes().to_vec(),
            CqlValue::Int(v) => v.to_be_bytes().to_vec(),
            CqlValue::BigInt(v) | CqlValue::Timestamp(v) | CqlValue::Time(v) => {
                v.to_be_bytes().to_vec()
            }
            CqlValue::Float(v) => v.to_be_bytes().to_vec(),
            CqlValue::Double(v) => v.to_be_bytes().to_vec(),
            CqlValue::Date(v) => v.to_be_bytes().to_vec(),
            CqlValue::Uuid(u) | CqlValue::TimeUuid(u) => u.as_bytes().to_vec(),
            CqlValue::Inet(IpAddr::V4(addr)) => addr.octets().to_vec(),
            CqlValue::Inet(IpAddr::V6(addr)) => addr.octets().to_vec(),
            CqlValue::Decimal { scale, unscaled } => {
                let mut out = scale.to_be_bytes().to_vec();
                out.extend_from_slice(unscaled);
                out
            }
        }
    }
}

fn compose_utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| CdcError::key_decode(format!("invalid {what} bytes: {e}")))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        CdcError::key_decode(format!(
            "{what} value must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Deserialize a partition-key buffer into one value per key column.
///
/// A single-column key is the raw serialized value. A composite key is a
/// sequence of length-framed components, optionally preceded by the 2-byte
/// `0xFFFF` static marker, each followed by an end-of-component byte; a
/// non-zero end-of-component byte stops the decode.
pub fn decode_partition_key(columns: &[ColumnMeta], key: &[u8]) -> Result<Vec<CqlValue>> {
    if columns.is_empty() {
        return Err(CdcError::key_decode("table has no partition key columns"));
    }
    if columns.len() == 1 {
        return Ok(vec![columns[0].cql_type.compose(key)?]);
    }

    let mut buf = key;
    if buf.len() >= 2 && buf[0] == 0xFF && buf[1] == 0xFF {
        buf = &buf[2..];
    }

    let mut values = Vec::with_capacity(columns.len());
    let mut i = 0;
    while !buf.is_empty() && i < columns.len() {
        if buf.len() < 2 {
            return Err(CdcError::key_decode(format!(
                "truncated length prefix for component {i}"
            )));
        }
        let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        buf = &buf[2..];
        if buf.len() < len + 1 {
            return Err(CdcError::key_decode(format!(
                "component {i} claims {len} bytes, {} remaining",
                buf.len()
            )));
        }
        let (value, rest) = buf.split_at(len);
        values.push(columns[i].cql_type.compose(value)?);
        let end_of_component = rest[0];
        buf = &rest[1..];
        if end_of_component != 0 {
            break;
        }
        i += 1;
    }
    Ok(values)
}

/// Serialize values into a partition-key buffer. Inverse of
/// [`decode_partition_key`]; used by fixtures and tests.
pub fn encode_partition_key(values: &[CqlValue]) -> Vec<u8> {
    if values.len() == 1 {
        return values[0].serialize();
    }
    let mut out = Vec::new();
    for value in values {
        let bytes = value.serialize();
        out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&bytes);
        out.push(0);
    }
    out
}
