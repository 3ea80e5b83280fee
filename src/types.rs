//! Core types for partitioned change feeds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one independently ordered shard of the feed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u16);

impl fmt::Debug for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({})", self.0)
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque value certifying which lineage of a partition a resumed stream continues.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RecoveryToken(pub u64);

impl fmt::Debug for RecoveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoveryToken({:#x})", self.0)
    }
}

/// Position within a partition from which replay continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResumeCursor {
    /// Last sequence number seen.
    pub seq_no: u64,
    /// Start of the snapshot window `seq_no` belongs to.
    pub snapshot_start: u64,
    /// End of the snapshot window `seq_no` belongs to.
    pub snapshot_end: u64,
    /// Lineage the cursor was taken on.
    pub token: RecoveryToken,
}

impl ResumeCursor {
    /// Cursor for a partition that has never been consumed.
    pub fn beginning() -> Self {
        Self::default()
    }

    pub fn is_beginning(&self) -> bool {
        self.seq_no == 0 && self.snapshot_start == 0 && self.snapshot_end == 0
    }

    /// Advance to a sequence number, widening the snapshot window if needed.
    pub fn advance(&mut self, seq_no: u64) {
        self.seq_no = seq_no;
        if seq_no > self.snapshot_end {
            self.snapshot_end = seq_no;
        }
        if seq_no < self.snapshot_start {
            self.snapshot_start = seq_no;
        }
    }
}

/// Durably saved resume cursors for one consumer group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Checkpoint {
    /// Dataset the cursors were taken against.
    pub bucket_uuid: String,
    /// Cursor per partition.
    pub cursors: BTreeMap<PartitionId, ResumeCursor>,
}

impl Checkpoint {
    pub fn new(bucket_uuid: impl Into<String>) -> Self {
        Self {
            bucket_uuid: bucket_uuid.into(),
            cursors: BTreeMap::new(),
        }
    }

    /// Add a cursor for a partition.
    pub fn with_cursor(mut self, partition: PartitionId, cursor: ResumeCursor) -> Self {
        self.cursors.insert(partition, cursor);
        self
    }

    /// Cursor for a partition, or the beginning if none was saved.
    pub fn cursor(&self, partition: PartitionId) -> ResumeCursor {
        self.cursors
            .get(&partition)
            .copied()
            .unwrap_or_else(ResumeCursor::beginning)
    }
}
