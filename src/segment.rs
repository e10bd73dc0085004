//! Commit-log filename utilities.
//!
//! Segment files follow the database convention `CommitLog-<version>-<segmentId>.log`,
//! with an optional near-real-time sidecar `<segmentId>_cdc.idx` tracking the
//! flushed byte position inside the live segment.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CdcError, Result};

/// Suffix of closed commit-log segments.
pub const LOG_SUFFIX: &str = ".log";

/// Suffix of near-real-time index sidecars.
pub const INDEX_SUFFIX: &str = "_cdc.idx";

fn log_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^CommitLog-\d+-(\d+)\.log$").expect("valid regex"))
}

fn index_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)_cdc\.idx$").expect("valid regex"))
}

/// Whether `file_name` looks like a commit-log segment or its index sidecar.
pub fn is_commit_log(file_name: &str) -> bool {
    log_pattern().is_match(file_name) || index_pattern().is_match(file_name)
}

/// Extract the segment id from a `.log` or `_cdc.idx` file name.
pub fn extract_segment_id(file_name: &str) -> Option<u64> {
    let captures = log_pattern()
        .captures(file_name)
        .or_else(|| index_pattern().captures(file_name))?;
    captures[1].parse().ok()
}

/// Extract the segment id, failing on non-commit-log names.
pub fn try_extract_segment_id(file_name: &str) -> Result<u64> {
    extract_segment_id(file_name)
        .ok_or_else(|| CdcError::invalid_state(format!("not a commit log file name: {file_name}")))
}

/// Build a segment file name for the given descriptor version and segment id.
pub fn build_segment_filename(version: u32, segment_id: u64) -> String {
    format!("CommitLog-{version}-{segment_id}.log")
}

/// Build an index sidecar file name for the given segment id.
pub fn build_index_filename(segment_id: u64) -> String {
    format!("{segment_id}{INDEX_SUFFIX}")
}

/// Total order over commit-log file names: segment id ascending, ties broken
/// by suffix with `.log` before `_cdc.idx`.
pub fn compare_commit_logs(a: &str, b: &str) -> Ordering {
    let id_a = extract_segment_id(a);
    let id_b = extract_segment_id(b);
    id_a.cmp(&id_b).then_with(|| suffix_rank(a).cmp(&suffix_rank(b)))
}

fn suffix_rank(file_name: &str) -> u8 {
    if file_name.ends_with(INDEX_SUFFIX) {
        1
    } else {
        0
    }
}

/// List commit-log shaped files (segments and sidecars) in `dir`.
///
/// Unreadable entries and unrelated files are ignored. Returns an empty list
/// for a missing directory.
pub fn list_commit_logs(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Cannot list {}: {e}", dir.display());
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_commit_log)
        })
        .collect()
}

/// Move `file` into `target_dir`, preserving its name.
///
/// Uses an atomic rename when source and target live on the same device and
/// falls back to copy + delete across devices.
pub fn move_commit_log(file: &Path, target_dir: &Path) -> Result<()> {
    let name = file
        .file_name()
        .ok_or_else(|| CdcError::invalid_state(format!("no file name in {}", file.display())))?;
    std::fs::create_dir_all(target_dir)?;
    let target = target_dir.join(name);
    match std::fs::rename(file, &target) {
        Ok(()) => {
            debug!("Moved {} to {}", file.display(), target.display());
            Ok(())
        }
        Err(_) => {
            std::fs::copy(file, &target)?;
            std::fs::remove_file(file)?;
            debug!("Copied {} to {}", file.display(), target.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_segment_id_round_trip() {
        for id in [0u64, 1, 42, 1675000000000, u64::MAX] {
            assert_eq!(extract_segment_id(&build_segment_filename(7, id)), Some(id));
            assert_eq!(extract_segment_id(&build_index_filename(id)), Some(id));
        }
    }

    #[test]
    fn test_extract_rejects_unrelated_names() {
        assert_eq!(extract_segment_id("CommitLog-7-42.log.tmp"), None);
        assert_eq!(extract_segment_id("offset.dat"), None);
        assert_eq!(extract_segment_id("CommitLog-42.log"), None);
        assert!(try_extract_segment_id("whatever.txt").is_err());
    }

    #[test]
    fn test_is_commit_log() {
        assert!(is_commit_log("CommitLog-7-42.log"));
        assert!(is_commit_log("42_cdc.idx"));
        assert!(!is_commit_log("CommitLog-7-42.log.swp"));
        assert!(!is_commit_log("notes.md"));
    }

    #[test]
    fn test_ordering_by_segment_then_suffix() {
        let mut names = vec![
            "43_cdc.idx".to_string(),
            "CommitLog-7-43.log".to_string(),
            "CommitLog-7-41.log".to_string(),
            "CommitLog-7-42.log".to_string(),
        ];
        names.sort_by(|a, b| compare_commit_logs(a, b));
        assert_eq!(
            names,
            vec![
                "CommitLog-7-41.log",
                "CommitLog-7-42.log",
                "CommitLog-7-43.log",
                "43_cdc.idx",
            ]
        );
    }

    #[test]
    fn test_list_commit_logs_filters_and_missing_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("CommitLog-7-1.log"), b"x").unwrap();
        std::fs::write(dir.path().join("1_cdc.idx"), b"x").unwrap();
        std::fs::write(dir.path().join("README"), b"x").unwrap();

        let mut found: Vec<String> = list_commit_logs(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        found.sort();
        assert_eq!(found, vec!["1_cdc.idx", "CommitLog-7-1.log"]);

        assert!(list_commit_logs(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_move_commit_log() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("CommitLog-7-9.log");
        std::fs::write(&source, b"segment").unwrap();

        let target_dir = dir.path().join("archives");
        move_commit_log(&source, &target_dir).unwrap();

        assert!(!source.exists());
        assert_eq!(
            std::fs::read(target_dir.join("CommitLog-7-9.log")).unwrap(),
            b"segment"
        );
    }
}
