//! Post-processing of consumed segments.
//!
//! A segment that was read to completion is handed to the transfer policy:
//! archive it (default) or delete it, and park failed segments in the error
//! folder so they can be recycled back into the CDC directory for
//! reprocessing.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::ProducerConfig;
use crate::error::Result;
use crate::segment;

/// Archive folder name under the working root.
pub const ARCHIVE_FOLDER: &str = "archives";

/// Error folder name under the working root.
pub const ERROR_FOLDER: &str = "errors";

/// Disposition of consumed commit-log segments.
pub trait CommitLogTransfer: Send + Sync {
    /// Called after a segment was fully processed.
    fn on_success_transfer(&self, file: &Path) -> Result<()>;

    /// Called after a segment failed with a non-permissible error.
    fn on_error_transfer(&self, file: &Path) -> Result<()>;

    /// Move every file in the error folder back into `cdc_dir` so the
    /// detector rediscovers it.
    fn recycle_error_commit_log_files(&self, cdc_dir: &Path) -> Result<()>;
}

/// Archives successfully consumed segments under the working root.
pub struct ArchiveCommitLogTransfer {
    config: ProducerConfig,
}

impl ArchiveCommitLogTransfer {
    pub fn new(config: ProducerConfig) -> Self {
        Self { config }
    }
}

impl CommitLogTransfer for ArchiveCommitLogTransfer {
    fn on_success_transfer(&self, file: &Path) -> Result<()> {
        segment::move_commit_log(file, &self.config.archive_dir())
    }

    fn on_error_transfer(&self, file: &Path) -> Result<()> {
        segment::move_commit_log(file, &self.config.error_dir())
    }

    fn recycle_error_commit_log_files(&self, cdc_dir: &Path) -> Result<()> {
        recycle(&self.config, cdc_dir)
    }
}

/// Deletes successfully consumed segments instead of archiving them.
pub struct DeletingCommitLogTransfer {
    config: ProducerConfig,
}

impl DeletingCommitLogTransfer {
    pub fn new(config: ProducerConfig) -> Self {
        Self { config }
    }
}

impl CommitLogTransfer for DeletingCommitLogTransfer {
    fn on_success_transfer(&self, file: &Path) -> Result<()> {
        std::fs::remove_file(file)?;
        debug!("Deleted consumed segment {}", file.display());
        Ok(())
    }

    fn on_error_transfer(&self, file: &Path) -> Result<()> {
        segment::move_commit_log(file, &self.config.error_dir())
    }

    fn recycle_error_commit_log_files(&self, cdc_dir: &Path) -> Result<()> {
        recycle(&self.config, cdc_dir)
    }
}

fn recycle(config: &ProducerConfig, cdc_dir: &Path) -> Result<()> {
    for file in segment::list_commit_logs(&config.error_dir()) {
        if let Err(e) = segment::move_commit_log(&file, cdc_dir) {
            warn!("Cannot recycle {}: {e}", file.display());
        }
    }
    Ok(())
}
