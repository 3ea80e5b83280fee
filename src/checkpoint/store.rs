//! Checkpoint store contract and in-memory implementation.

use crate::error::Result;
use crate::types::Checkpoint;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persists and loads checkpoints per consumer group.
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint saved for `group`, if any.
    fn load(&self, group: &str) -> Result<Option<Checkpoint>>;

    /// Replace the checkpoint saved for `group`.
    fn save(&self, group: &str, checkpoint: &Checkpoint) -> Result<()>;
}

/// Checkpoint store kept in process memory.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    groups: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of groups with a saved checkpoint.
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self, group: &str) -> Result<Option<Checkpoint>> {
        Ok(self.groups.read().get(group).cloned())
    }

    fn save(&self, group: &str, checkpoint: &Checkpoint) -> Result<()> {
        self.groups
            .write()
            .insert(group.to_string(), checkpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartitionId, ResumeCursor};

    #[test]
    fn test_save_overwrites() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("group").unwrap().is_none());

        let first = Checkpoint::new("uuid").with_cursor(
            PartitionId(0),
            ResumeCursor {
                seq_no: 1,
                ..Default::default()
            },
        );
        let second = Checkpoint::new("uuid").with_cursor(
            PartitionId(1),
            ResumeCursor {
                seq_no: 2,
                ..Default::default()
            },
        );

        store.save("group", &first).unwrap();
        store.save("group", &second).unwrap();

        assert_eq!(store.load("group").unwrap(), Some(second));
        assert_eq!(store.group_count(), 1);
    }
}
