//! Loads and saves a consumer group's resume cursors.

use crate::error::{Result, StreamError};
use crate::types::{Checkpoint, PartitionId, ResumeCursor};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::store::CheckpointStore;

/// Binds a checkpoint store to one group and dataset.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    group: String,
    bucket_uuid: String,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        group: impl Into<String>,
        bucket_uuid: impl Into<String>,
    ) -> Self {
        Self {
            store,
            group: group.into(),
            bucket_uuid: bucket_uuid.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Resume cursors for `partitions`.
    ///
    /// Partitions without a saved cursor start from the beginning. A
    /// checkpoint taken against a different dataset is ignored entirely.
    pub fn load(&self, partitions: &[PartitionId]) -> Result<BTreeMap<PartitionId, ResumeCursor>> {
        let saved = self
            .store
            .load(&self.group)
            .map_err(|e| StreamError::CheckpointLoad {
                group: self.group.clone(),
                reason: e.to_string(),
            })?;

        let saved = match saved {
            Some(checkpoint) if checkpoint.bucket_uuid != self.bucket_uuid => {
                warn!(
                    group = %self.group,
                    saved = %checkpoint.bucket_uuid,
                    current = %self.bucket_uuid,
                    "discarding checkpoint taken against another bucket"
                );
                Checkpoint::new(self.bucket_uuid.clone())
            }
            Some(checkpoint) => checkpoint,
            None => Checkpoint::new(self.bucket_uuid.clone()),
        };

        debug!(group = %self.group, saved = saved.cursors.len(), "loaded checkpoint");

        Ok(partitions.iter().map(|p| (*p, saved.cursor(*p))).collect())
    }

    /// Replace the saved checkpoint with `cursors`.
    pub fn save(&self, cursors: BTreeMap<PartitionId, ResumeCursor>) -> Result<()> {
        let checkpoint = Checkpoint {
            bucket_uuid: self.bucket_uuid.clone(),
            cursors,
        };

        self.store
            .save(&self.group, &checkpoint)
            .map_err(|e| StreamError::CheckpointSave {
                group: self.group.clone(),
                reason: e.to_string(),
            })?;

        debug!(group = %self.group, partitions = checkpoint.cursors.len(), "saved checkpoint");
        Ok(())
    }
}
