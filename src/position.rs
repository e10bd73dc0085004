//! Commit-log position: the durable cursor coordinate.
//!
//! A [`CommitLogPosition`] is a `(segment_id, position)` pair ordered
//! lexicographically. It means "all mutations at or before this byte offset
//! of this segment have been durably published".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CdcError;

/// Totally ordered `(segment_id, position)` pair.
///
/// The derived `Ord` is lexicographic: segment id first, byte position
/// within the segment second.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CommitLogPosition {
    /// Segment id extracted from the commit-log file name
    pub segment_id: u64,
    /// Byte offset of the entry within the segment
    pub position: i32,
}

impl CommitLogPosition {
    pub fn new(segment_id: u64, position: i32) -> Self {
        Self {
            segment_id,
            position,
        }
    }
}

impl fmt::Display for CommitLogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.position)
    }
}

impl FromStr for CommitLogPosition {
    type Err = CdcError;

    /// Parse the `segmentId:position` form used by the file offset backend.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (seg, pos) = s
            .split_once(':')
            .ok_or_else(|| CdcError::serialization(format!("invalid offset '{s}'")))?;
        let segment_id = seg
            .trim()
            .parse::<u64>()
            .map_err(|e| CdcError::serialization(format!("invalid segment id '{seg}': {e}")))?;
        let position = pos
            .trim()
            .parse::<i32>()
            .map_err(|e| CdcError::serialization(format!("invalid position '{pos}': {e}")))?;
        Ok(Self {
            segment_id,
            position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_lexicographic() {
        let a = CommitLogPosition::new(1, 500);
        let b = CommitLogPosition::new(2, 0);
        let c = CommitLogPosition::new(2, 10);

        assert!(a < b);
        assert!(b < c);
        assert!(a < c);
        assert_eq!(c, CommitLogPosition::new(2, 10));
    }

    #[test]
    fn test_display_round_trip() {
        let pos = CommitLogPosition::new(42, 1187);
        let parsed: CommitLogPosition = pos.to_string().parse().unwrap();
        assert_eq!(pos, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<CommitLogPosition>().is_err());
        assert!("42".parse::<CommitLogPosition>().is_err());
        assert!("a:b".parse::<CommitLogPosition>().is_err());
        assert!("-1:0".parse::<CommitLogPosition>().is_err());
    }

    #[test]
    fn test_default_is_zero() {
        let pos = CommitLogPosition::default();
        assert_eq!(pos, CommitLogPosition::new(0, 0));
    }
}
