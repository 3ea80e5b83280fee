//! Fan-out of tagged events to registered listeners.

use crate::barrier::{CompletionBarrier, Signal};
use crate::error::TransportError;
use crate::events::{Event, EventKind, EventSink, Listener};
use crate::types::PartitionId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Copy-on-write list of listeners.
///
/// Registration swaps in a new list, so delivery never holds the lock while
/// calling listeners and registration may happen at any time.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: RwLock<Arc<Vec<Listener>>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&self, listener: Listener) {
        let mut listeners = self.listeners.write();
        let mut next = Vec::with_capacity(listeners.len() + 1);
        next.extend(listeners.iter().cloned());
        next.push(listener);
        *listeners = Arc::new(next);
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Listener>> {
        Arc::clone(&*self.listeners.read())
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Counters for dispatched events.
#[derive(Default)]
pub(crate) struct DispatchCounters {
    delivered: AtomicU64,
    bookkeeping: AtomicU64,
    skipped_errors: AtomicU64,
    end_of_stream: AtomicU64,
}

impl DispatchCounters {
    pub(crate) fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            bookkeeping: self.bookkeeping.load(Ordering::Relaxed),
            skipped_errors: self.skipped_errors.load(Ordering::Relaxed),
            end_of_stream: self.end_of_stream.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time dispatch statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events handed to listeners.
    pub delivered: u64,
    /// Events withheld as bookkeeping.
    pub bookkeeping: u64,
    /// Events dropped because the transport reported an error.
    pub skipped_errors: u64,
    /// End-of-stream events seen.
    pub end_of_stream: u64,
}

/// Sink that routes observer output to listeners and the completion barrier.
pub(crate) struct Dispatcher {
    listeners: Arc<ListenerRegistry>,
    barrier: Arc<CompletionBarrier>,
    counters: Arc<DispatchCounters>,
}

impl Dispatcher {
    pub(crate) fn new(
        listeners: Arc<ListenerRegistry>,
        barrier: Arc<CompletionBarrier>,
        counters: Arc<DispatchCounters>,
    ) -> Self {
        Self {
            listeners,
            barrier,
            counters,
        }
    }
}

impl EventSink for Dispatcher {
    fn deliver(&self, partition: PartitionId, event: Result<Event, TransportError>) {
        let event = match event {
            Ok(event) => event,
            Err(error) => {
                self.counters.skipped_errors.fetch_add(1, Ordering::Relaxed);
                warn!(partition = %partition, %error, "skipping errored event");
                return;
            }
        };

        match event.kind {
            EventKind::EndOfStream => {
                self.counters.end_of_stream.fetch_add(1, Ordering::Relaxed);
                if self.barrier.signal(partition) == Signal::AlreadyCompleted {
                    debug!(partition = %partition, "end of stream after partition already completed");
                }
            }
            EventKind::Bookkeeping => {
                self.counters.bookkeeping.fetch_add(1, Ordering::Relaxed);
                return;
            }
            _ => {}
        }

        let listeners = self.listeners.snapshot();
        for listener in listeners.iter() {
            listener(&event);
        }
        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
    }
}
