//! Error types for the commit-log CDC producer.
//!
//! A single crate-wide error enum with constructor helpers. Parse errors
//! raised by the external segment parser keep their own type
//! ([`ParseError`](crate::parser::ParseError)) because the permissible /
//! non-permissible distinction drives segment disposition; everything else
//! funnels into [`CdcError`].

use thiserror::Error;

use crate::parser::ParseError;

/// Errors produced while tailing commit logs and publishing mutations.
#[derive(Error, Debug)]
pub enum CdcError {
    /// Configuration error (invalid or missing settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Offset backend failed to persist the cursor
    #[error("Offset persist error: {0}")]
    OffsetPersist(String),

    /// Malformed partition key buffer
    #[error("Partition key decode error: {0}")]
    KeyDecode(String),

    /// Schema derivation or table metadata error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Segment parse error surfaced by the external commit-log parser
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Publish failure reported by the bus client
    #[error("Publisher error: {0}")]
    Publisher(String),

    /// The bus client could not be initialized
    #[error("Publisher init error: {0}")]
    PublisherInit(String),

    /// AVRO encoding error
    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    /// Serialization error (JSON, offset file format)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying Pulsar client error
    #[cfg(feature = "pulsar")]
    #[error("Pulsar error: {0}")]
    Pulsar(#[from] ::pulsar::Error),
}

impl CdcError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new offset persist error
    pub fn offset_persist(msg: impl Into<String>) -> Self {
        Self::OffsetPersist(msg.into())
    }

    /// Create a new partition key decode error
    pub fn key_decode(msg: impl Into<String>) -> Self {
        Self::KeyDecode(msg.into())
    }

    /// Create a new schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a new publisher error
    pub fn publisher(msg: impl Into<String>) -> Self {
        Self::Publisher(msg.into())
    }

    /// Create a new publisher init error
    pub fn publisher_init(msg: impl Into<String>) -> Self {
        Self::PublisherInit(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Result type for CDC operations
pub type Result<T> = std::result::Result<T, CdcError>;
