//! Contract with the external commit-log parser.
//!
//! The parser library owns segment framing: it walks one segment file,
//! reconstructs each serialized mutation, and invokes the registered
//! [`CommitLogReadHandler`] per entry. This module pins down that callback
//! contract and the data the parser surfaces; parser internals (and their
//! per-database-version bindings) live outside this crate.
//!
//! Error discipline: the parser reports recoverable conditions through
//! [`CommitLogReadHandler::should_skip_segment_on_error`] and keeps reading
//! when the error is permissible. A non-permissible error aborts the
//! segment and is returned from [`CommitLogParser::read_segment`]; the
//! reader then routes the segment to the error folder.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::error::Result;
use crate::table::TableMetadata;

/// Sentinel for "no timestamp present" on liveness and deletion markers.
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Identity of the segment being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    /// Bare file name, e.g. `CommitLog-7-42.log`
    pub file_name: String,
}

impl SegmentDescriptor {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }
}

/// Parse failure surfaced by the parser.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Recoverable for the rest of the segment when true
    pub permissible: bool,
}

impl ParseError {
    pub fn permissible(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permissible: true,
        }
    }

    pub fn non_permissible(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permissible: false,
        }
    }
}

/// A row or range-tombstone marker inside a partition update's row iterator.
#[derive(Debug, Clone)]
pub enum Unfiltered {
    Row(RowEntry),
    RangeTombstoneMarker,
}

/// One row-level entry.
#[derive(Debug, Clone)]
pub struct RowEntry {
    /// Serialized clustering values, one buffer per clustering column
    pub clustering: Vec<Vec<u8>>,
    /// Primary-key liveness timestamp in microseconds, [`NO_TIMESTAMP`] when absent
    pub liveness_timestamp: i64,
    /// Row deletion timestamp in microseconds, [`NO_TIMESTAMP`] when absent
    pub deletion_timestamp: i64,
}

impl RowEntry {
    /// Entry for a freshly inserted row.
    pub fn insert(clustering: Vec<Vec<u8>>, timestamp_micros: i64) -> Self {
        Self {
            clustering,
            liveness_timestamp: timestamp_micros,
            deletion_timestamp: NO_TIMESTAMP,
        }
    }

    /// Entry for an update (no primary-key liveness).
    pub fn update(clustering: Vec<Vec<u8>>) -> Self {
        Self {
            clustering,
            liveness_timestamp: NO_TIMESTAMP,
            deletion_timestamp: NO_TIMESTAMP,
        }
    }

    /// Entry for a row deletion.
    pub fn delete(clustering: Vec<Vec<u8>>, timestamp_micros: i64) -> Self {
        Self {
            clustering,
            liveness_timestamp: NO_TIMESTAMP,
            deletion_timestamp: timestamp_micros,
        }
    }
}

/// The slice of a mutation that targets one partition.
#[derive(Debug, Clone)]
pub struct PartitionUpdate<M> {
    pub metadata: Arc<M>,
    /// Raw partition-key buffer (single value or composite layout)
    pub partition_key: Vec<u8>,
    /// Partition-level deletion timestamp in microseconds, [`NO_TIMESTAMP`] when absent
    pub partition_deletion: i64,
    /// Maximum cell timestamp across the update, in microseconds
    pub max_timestamp: i64,
    pub entries: Vec<Unfiltered>,
}

impl<M> PartitionUpdate<M> {
    pub fn is_partition_deletion(&self) -> bool {
        self.partition_deletion > NO_TIMESTAMP
    }
}

/// One commit-log entry as reconstructed by the parser: a database-level
/// mutation spanning one or more partition updates, plus its serialized
/// wire form at the current protocol version (digest input).
#[derive(Debug, Clone)]
pub struct RawMutation<M> {
    /// False when the table is not CDC-enabled; such entries are ignored
    pub tracked_by_cdc: bool,
    /// Serialized mutation bytes from the parser's serializer
    pub wire: Bytes,
    pub updates: Vec<PartitionUpdate<M>>,
}

/// Callbacks invoked by the parser while reading one segment.
#[async_trait]
pub trait CommitLogReadHandler<M: TableMetadata>: Send {
    /// Called once per reconstructed mutation. `entry_location` is the byte
    /// offset of the entry's end within the segment.
    async fn handle_mutation(
        &mut self,
        mutation: &RawMutation<M>,
        size: i32,
        entry_location: i32,
        descriptor: &SegmentDescriptor,
    ) -> Result<()>;

    /// Called when the parser hits a fatal condition for the segment.
    fn handle_unrecoverable_error(&mut self, error: &ParseError);

    /// Asked whether a failed segment should be skipped. Returning `false`
    /// makes a non-permissible error abort the read.
    fn should_skip_segment_on_error(&mut self, error: &ParseError) -> bool;
}

/// The external segment parser.
#[async_trait]
pub trait CommitLogParser<M: TableMetadata>: Send + Sync {
    /// Read one segment, invoking `handler` for every entry in commit-log
    /// order. Returns the non-permissible error that aborted the read, if
    /// any; permissible errors are reported to the handler and skipped.
    async fn read_segment(
        &self,
        path: &Path,
        handler: &mut (dyn CommitLogReadHandler<M> + Send),
    ) -> std::result::Result<(), ParseError>;
}
