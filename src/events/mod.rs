//! Event relay from partition streams.
//!
//! Each partition's transport calls into a shared [`Observer`], which:
//! - Tags raw callbacks with a partition-agnostic [`EventKind`]
//! - Marks control messages and connector-owned documents as bookkeeping
//! - Tracks the latest resume cursor per partition
//!
//! Tagged events go to a single [`EventSink`], normally the stream's
//! dispatcher, which fans them out to registered listeners.

mod observer;
mod types;

pub use observer::{Observer, DEFAULT_BOOKKEEPING_PREFIX};
pub use types::{Document, EndReason, Event, EventKind, EventSink, Listener, RawEvent};
