//! Checkpoint persistence.
//!
//! A checkpoint holds one resume cursor per partition for a named consumer
//! group. Stores only persist and load whole checkpoints; the
//! [`CheckpointManager`] fills in defaults and scopes checkpoints to the
//! dataset they were taken against.

mod file;
mod manager;
mod store;

pub use file::FileCheckpointStore;
pub use manager::CheckpointManager;
pub use store::{CheckpointStore, MemoryCheckpointStore};
