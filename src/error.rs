//! Error types for stream orchestration.

use crate::types::PartitionId;
use std::fmt;
use thiserror::Error;

/// Failure reported by the stream transport for a single request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("partition is not owned by this node")]
    NotMyPartition,

    #[error("rollback required to seq_no {0}")]
    Rollback(u64),

    #[error("request timed out")]
    Timeout,

    #[error("transport disconnected before the request resolved")]
    Disconnected,
}

/// A single partition's failed request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionFailure {
    pub partition: PartitionId,
    pub error: TransportError,
}

/// Failed requests collected across a group of partitions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionFailures(pub Vec<PartitionFailure>);

impl PartitionFailures {
    pub fn partitions(&self) -> Vec<PartitionId> {
        self.0.iter().map(|f| f.partition).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for PartitionFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "partition {}: {}", failure.partition, failure.error)?;
        }
        Ok(())
    }
}

/// Main error type for stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot enumerate owned partitions: {0}")]
    Membership(String),

    #[error("Recovery tokens unavailable: {0}")]
    RecoveryUnavailable(String),

    #[error("Failed to open {} partition(s): {failures}", .failures.len())]
    PartitionOpen { failures: PartitionFailures },

    #[error("Failed to close {} partition(s): {failures}", .failures.len())]
    PartitionClose { failures: PartitionFailures },

    #[error("Checkpoint load failed for group {group}: {reason}")]
    CheckpointLoad { group: String, reason: String },

    #[error("Checkpoint save failed for group {group}: {reason}")]
    CheckpointSave { group: String, reason: String },

    #[error("Stream already started")]
    AlreadyStarted,

    #[error("Stream not started")]
    NotStarted,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid checkpoint format: {0}")]
    InvalidFormat(String),

    #[error("Checkpoint directory is locked by another process")]
    Locked,
}

impl StreamError {
    /// Partitions named by a partition-scoped error.
    pub fn failed_partitions(&self) -> Vec<PartitionId> {
        match self {
            StreamError::PartitionOpen { failures } | StreamError::PartitionClose { failures } => {
                failures.partitions()
            }
            _ => Vec::new(),
        }
    }
}

impl From<rmp_serde::encode::Error> for StreamError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StreamError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StreamError::Deserialization(e.to_string())
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;
