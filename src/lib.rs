//! # Partition Feed
//!
//! Lifecycle orchestration for a partitioned change-data-capture feed.
//!
//! ## Core Concepts
//!
//! - **Partitions**: Independently ordered shards of the feed, one stream each
//! - **Observer**: Relays raw stream callbacks as tagged events
//! - **Listeners**: Consumer callbacks receiving every non-bookkeeping event
//! - **Checkpoints**: Saved resume cursors for a named consumer group
//!
//! ## Example
//!
//! ```ignore
//! use partition_feed::{MemoryCheckpointStore, Stream, StreamConfig};
//!
//! let stream = Stream::new(client, Arc::new(MemoryCheckpointStore::new()), StreamConfig::default());
//! stream.add_listener(|event| println!("{:?} on {}", event.kind, event.partition));
//!
//! // Open every owned partition, resuming from the saved checkpoint
//! stream.start()?;
//!
//! // Block until every partition reaches end of stream, then checkpoint
//! stream.wait()?;
//! ```

pub mod barrier;
pub mod checkpoint;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod stream;
pub mod types;

// Re-exports
pub use barrier::{CompletionBarrier, Signal};
pub use checkpoint::{
    CheckpointManager, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use client::{
    pending, Client, Identity, MembershipProvider, Pending, RecoveryProvider, Resolver,
    StreamTransport,
};
pub use dispatch::DispatchStats;
pub use error::{PartitionFailure, PartitionFailures, Result, StreamError, TransportError};
pub use events::{
    Document, EndReason, Event, EventKind, EventSink, Listener, Observer, RawEvent,
    DEFAULT_BOOKKEEPING_PREFIX,
};
pub use stream::{CloseMode, Stream, StreamConfig};
pub use types::*;
