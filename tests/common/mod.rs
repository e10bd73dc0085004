//! Shared fixtures: a scripted segment parser and helpers to build raw
//! mutations the way the real parser surfaces them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use tidelog::{
    CommitLogParser, CommitLogReadHandler, CqlType, CqlValue, ParseError, PartitionUpdate,
    RawMutation, RowEntry, SegmentDescriptor, TableSpec, Unfiltered, NO_TIMESTAMP,
};

/// One scripted callback for a segment.
pub struct ScriptedEntry {
    pub mutation: RawMutation<TableSpec>,
    pub size: i32,
    pub location: i32,
}

/// Parser that replays a fixed script per segment file name. Files without
/// a script parse as empty segments; a file name can also be scripted to
/// fail outright.
#[derive(Default)]
pub struct ScriptedParser {
    scripts: Mutex<HashMap<String, Vec<Arc<ScriptedEntry>>>>,
    failures: Mutex<HashMap<String, String>>,
}

impl ScriptedParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, file_name: &str, mutation: RawMutation<TableSpec>, location: i32) {
        self.scripts
            .lock()
            .unwrap()
            .entry(file_name.to_string())
            .or_default()
            .push(Arc::new(ScriptedEntry {
                mutation,
                size: 64,
                location,
            }));
    }

    pub fn fail(&self, file_name: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(file_name.to_string(), message.to_string());
    }
}

#[async_trait]
impl CommitLogParser<TableSpec> for ScriptedParser {
    async fn read_segment(
        &self,
        path: &Path,
        handler: &mut (dyn CommitLogReadHandler<TableSpec> + Send),
    ) -> Result<(), ParseError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if let Some(message) = self.failures.lock().unwrap().get(&name) {
            let error = ParseError::non_permissible(message.clone());
            handler.should_skip_segment_on_error(&error);
            return Err(error);
        }

        let entries = self
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        let descriptor = SegmentDescriptor::new(&name);
        for entry in entries {
            if let Err(e) = handler
                .handle_mutation(&entry.mutation, entry.size, entry.location, &descriptor)
                .await
            {
                let error = ParseError::non_permissible(e.to_string());
                handler.should_skip_segment_on_error(&error);
                return Err(error);
            }
        }
        Ok(())
    }
}

pub fn text_table() -> Arc<TableSpec> {
    Arc::new(TableSpec::new("ks", "t").with_partition_column("id", CqlType::Text))
}

pub fn decimal_table() -> Arc<TableSpec> {
    Arc::new(TableSpec::new("ks", "t").with_partition_column("id", CqlType::Decimal))
}

pub fn insert_mutation(
    metadata: Arc<TableSpec>,
    key: CqlValue,
    ts_micros: i64,
) -> RawMutation<TableSpec> {
    RawMutation {
        tracked_by_cdc: true,
        wire: Bytes::from(format!("wire:{ts_micros}")),
        updates: vec![PartitionUpdate {
            metadata,
            partition_key: key.serialize(),
            partition_deletion: NO_TIMESTAMP,
            max_timestamp: ts_micros,
            entries: vec![Unfiltered::Row(RowEntry::insert(vec![], ts_micros))],
        }],
    }
}

pub fn partition_delete_mutation(
    metadata: Arc<TableSpec>,
    key: CqlValue,
    ts_micros: i64,
) -> RawMutation<TableSpec> {
    RawMutation {
        tracked_by_cdc: true,
        wire: Bytes::from(format!("wire:del:{ts_micros}")),
        updates: vec![PartitionUpdate {
            metadata,
            partition_key: key.serialize(),
            partition_deletion: ts_micros,
            max_timestamp: ts_micros,
            entries: vec![],
        }],
    }
}

pub fn range_tombstone_mutation(metadata: Arc<TableSpec>) -> RawMutation<TableSpec> {
    RawMutation {
        tracked_by_cdc: true,
        wire: Bytes::from_static(b"wire:range"),
        updates: vec![PartitionUpdate {
            metadata,
            partition_key: CqlValue::Text("a".to_string()).serialize(),
            partition_deletion: NO_TIMESTAMP,
            max_timestamp: 1,
            entries: vec![Unfiltered::RangeTombstoneMarker],
        }],
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
