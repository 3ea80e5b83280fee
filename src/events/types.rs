//! Event types relayed from partition streams.

use crate::error::TransportError;
use crate::types::PartitionId;
use std::sync::Arc;

/// A document change carried by mutation, deletion and expiration events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub key: Vec<u8>,
    /// Empty for deletions and expirations.
    pub value: Vec<u8>,
    pub seq_no: u64,
    pub rev_no: u64,
    pub cas: u64,
    pub collection_id: u32,
}

impl Document {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>, seq_no: u64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            seq_no,
            rev_no: 0,
            cas: 0,
            collection_id: 0,
        }
    }
}

/// Why a partition's stream ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// Reached the requested end sequence.
    Finished,
    /// Closed on request.
    Closed,
    /// Ownership of the partition moved elsewhere.
    StateChanged,
    /// The connection carrying the stream was lost.
    Disconnected,
}

/// Protocol-level callback from a partition's stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEvent {
    Mutation(Document),
    Deletion(Document),
    Expiration(Document),
    /// Start of a snapshot window.
    SnapshotMarker { start: u64, end: u64 },
    /// The partition advanced without producing a visible change.
    SeqNoAdvanced { seq_no: u64 },
    StreamEnd { reason: EndReason },
}

impl RawEvent {
    /// The document this event carries, if any.
    pub fn document(&self) -> Option<&Document> {
        match self {
            RawEvent::Mutation(doc) | RawEvent::Deletion(doc) | RawEvent::Expiration(doc) => {
                Some(doc)
            }
            _ => None,
        }
    }
}

/// Partition-agnostic kind of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Mutation,
    Deletion,
    Expiration,
    EndOfStream,
    /// Internal control message or change to a bookkeeping document.
    Bookkeeping,
}

/// A tagged event as seen by listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub partition: PartitionId,
    pub kind: EventKind,
    pub payload: RawEvent,
}

/// Callback invoked for every non-bookkeeping event.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Receives tagged events from an [`Observer`](super::Observer).
///
/// Called concurrently from whichever partition delivers an event.
pub trait EventSink: Send + Sync {
    fn deliver(&self, partition: PartitionId, event: Result<Event, TransportError>);
}
