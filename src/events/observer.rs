//! Observer relaying raw partition callbacks to a single sink.

use crate::error::TransportError;
use crate::types::{PartitionId, ResumeCursor};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::trace;

use super::types::{Event, EventKind, EventSink, RawEvent};

/// Default key prefix of documents the connector writes for itself.
pub const DEFAULT_BOOKKEEPING_PREFIX: &str = "_connector:cbgo:";

/// Translates raw stream callbacks into tagged events.
///
/// The observer also tracks each partition's resume cursor as events pass
/// through, so the latest progress can be checkpointed at any time. The set
/// of partitions is fixed at construction; each partition's cursor sits
/// behind its own lock.
pub struct Observer {
    cursors: HashMap<PartitionId, Mutex<ResumeCursor>>,
    bookkeeping_prefix: Vec<u8>,
    sink: Arc<dyn EventSink>,
}

impl Observer {
    pub fn new(
        cursors: BTreeMap<PartitionId, ResumeCursor>,
        bookkeeping_prefix: impl Into<Vec<u8>>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cursors: cursors
                .into_iter()
                .map(|(p, cursor)| (p, Mutex::new(cursor)))
                .collect(),
            bookkeeping_prefix: bookkeeping_prefix.into(),
            sink,
        }
    }

    /// Handle one callback from a partition's stream.
    ///
    /// Errors are not recovered here; they go to the sink untouched.
    pub fn on_event(&self, partition: PartitionId, event: Result<RawEvent, TransportError>) {
        let raw = match event {
            Ok(raw) => raw,
            Err(e) => {
                self.sink.deliver(partition, Err(e));
                return;
            }
        };

        self.track(partition, &raw);

        let kind = self.classify(&raw);
        trace!(partition = %partition, ?kind, "relaying event");

        self.sink.deliver(
            partition,
            Ok(Event {
                partition,
                kind,
                payload: raw,
            }),
        );
    }

    /// Current cursor for a partition.
    pub fn cursor(&self, partition: PartitionId) -> Option<ResumeCursor> {
        self.cursors.get(&partition).map(|c| *c.lock())
    }

    /// Snapshot of every partition's cursor.
    pub fn cursors(&self) -> BTreeMap<PartitionId, ResumeCursor> {
        self.cursors
            .iter()
            .map(|(p, cursor)| (*p, *cursor.lock()))
            .collect()
    }

    fn track(&self, partition: PartitionId, raw: &RawEvent) {
        let Some(cursor) = self.cursors.get(&partition) else {
            return;
        };
        let mut cursor = cursor.lock();

        match raw {
            RawEvent::Mutation(doc) | RawEvent::Deletion(doc) | RawEvent::Expiration(doc) => {
                cursor.advance(doc.seq_no)
            }
            RawEvent::SnapshotMarker { start, end } => {
                cursor.snapshot_start = *start;
                cursor.snapshot_end = *end;
            }
            RawEvent::SeqNoAdvanced { seq_no } => cursor.advance(*seq_no),
            RawEvent::StreamEnd { .. } => {}
        }
    }

    fn classify(&self, raw: &RawEvent) -> EventKind {
        if let Some(doc) = raw.document() {
            if self.is_bookkeeping_key(&doc.key) {
                return EventKind::Bookkeeping;
            }
        }

        match raw {
            RawEvent::Mutation(_) => EventKind::Mutation,
            RawEvent::Deletion(_) => EventKind::Deletion,
            RawEvent::Expiration(_) => EventKind::Expiration,
            RawEvent::StreamEnd { .. } => EventKind::EndOfStream,
            RawEvent::SnapshotMarker { .. } | RawEvent::SeqNoAdvanced { .. } => {
                EventKind::Bookkeeping
            }
        }
    }

    fn is_bookkeeping_key(&self, key: &[u8]) -> bool {
        !self.bookkeeping_prefix.is_empty() && key.starts_with(&self.bookkeeping_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{Document, EndReason};

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<(PartitionId, Result<Event, TransportError>)>>,
    }

    impl EventSink for Collect {
        fn deliver(&self, partition: PartitionId, event: Result<Event, TransportError>) {
            self.events.lock().push((partition, event));
        }
    }

    fn observer(sink: Arc<Collect>) -> Observer {
        let cursors = [PartitionId(0), PartitionId(1)]
            .into_iter()
            .map(|p| (p, ResumeCursor::beginning()))
            .collect();
        Observer::new(cursors, DEFAULT_BOOKKEEPING_PREFIX, sink)
    }

    fn kinds(sink: &Collect) -> Vec<EventKind> {
        sink.events
            .lock()
            .iter()
            .filter_map(|(_, e)| e.as_ref().ok().map(|e| e.kind))
            .collect()
    }

    #[test]
    fn test_tags_content_events() {
        let sink = Arc::new(Collect::default());
        let observer = observer(Arc::clone(&sink));

        observer.on_event(PartitionId(0), Ok(RawEvent::Mutation(Document::new("a", "1", 1))));
        observer.on_event(PartitionId(0), Ok(RawEvent::Deletion(Document::new("a", "", 2))));
        observer.on_event(PartitionId(0), Ok(RawEvent::Expiration(Document::new("b", "", 3))));
        observer.on_event(
            PartitionId(0),
            Ok(RawEvent::StreamEnd {
                reason: EndReason::Finished,
            }),
        );

        assert_eq!(
            kinds(&sink),
            vec![
                EventKind::Mutation,
                EventKind::Deletion,
                EventKind::Expiration,
                EventKind::EndOfStream
            ]
        );
    }

    #[test]
    fn test_tags_bookkeeping() {
        let sink = Arc::new(Collect::default());
        let observer = observer(Arc::clone(&sink));

        let key = format!("{}checkpoint:0", DEFAULT_BOOKKEEPING_PREFIX);
        observer.on_event(PartitionId(1), Ok(RawEvent::Mutation(Document::new(key, "{}", 4))));
        observer.on_event(PartitionId(1), Ok(RawEvent::SnapshotMarker { start: 4, end: 9 }));
        observer.on_event(PartitionId(1), Ok(RawEvent::SeqNoAdvanced { seq_no: 9 }));

        assert_eq!(kinds(&sink), vec![EventKind::Bookkeeping; 3]);
    }

    #[test]
    fn test_tracks_cursor() {
        let sink = Arc::new(Collect::default());
        let observer = observer(sink);

        observer.on_event(PartitionId(0), Ok(RawEvent::SnapshotMarker { start: 10, end: 20 }));
        observer.on_event(PartitionId(0), Ok(RawEvent::Mutation(Document::new("k", "v", 15))));

        let cursor = observer.cursor(PartitionId(0)).unwrap();
        assert_eq!(cursor.seq_no, 15);
        assert_eq!((cursor.snapshot_start, cursor.snapshot_end), (10, 20));

        assert!(observer.cursor(PartitionId(1)).unwrap().is_beginning());
        assert!(observer.cursor(PartitionId(5)).is_none());
    }

    #[test]
    fn test_errors_forwarded_without_tracking() {
        let sink = Arc::new(Collect::default());
        let observer = observer(Arc::clone(&sink));

        observer.on_event(PartitionId(0), Err(TransportError::Rollback(3)));

        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1, Err(TransportError::Rollback(3)));
        assert!(observer.cursor(PartitionId(0)).unwrap().is_beginning());
    }
}
