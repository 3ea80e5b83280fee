//! Scripted client shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use partition_feed::{
    pending, Checkpoint, CheckpointStore, Document, EndReason, Identity, MemoryCheckpointStore,
    MembershipProvider, Observer, PartitionId, Pending, RawEvent, RecoveryProvider, RecoveryToken,
    Resolver, Result, ResumeCursor, StreamError, StreamTransport, TransportError,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn token_for(partition: PartitionId) -> RecoveryToken {
    RecoveryToken(1000 + partition.0 as u64)
}

pub fn mutation(key: &str, seq_no: u64) -> RawEvent {
    RawEvent::Mutation(Document::new(key, "{}", seq_no))
}

pub fn end() -> RawEvent {
    RawEvent::StreamEnd {
        reason: EndReason::Finished,
    }
}

/// In-process stand-in for a data store client.
///
/// Open requests resolve on a background thread; a partition with a script
/// then plays its events in order on that same thread.
pub struct MockClient {
    partitions: Vec<PartitionId>,
    bucket_uuid: String,
    group: String,
    membership_error: bool,
    missing_tokens: HashSet<PartitionId>,
    open_failures: HashMap<PartitionId, TransportError>,
    close_failures: HashMap<PartitionId, TransportError>,
    hanging_opens: HashSet<PartitionId>,
    scripts: HashMap<PartitionId, Vec<RawEvent>>,
    end_on_close: bool,

    pub opened: Mutex<Vec<(PartitionId, RecoveryToken, ResumeCursor)>>,
    pub closed: Mutex<Vec<PartitionId>>,
    observer: Mutex<Option<Arc<Observer>>>,
    held: Mutex<Vec<Resolver>>,
}

impl MockClient {
    pub fn new(partition_count: u16) -> Self {
        Self {
            partitions: (0..partition_count).map(PartitionId).collect(),
            bucket_uuid: "bucket-1".to_string(),
            group: "group-1".to_string(),
            membership_error: false,
            missing_tokens: HashSet::new(),
            open_failures: HashMap::new(),
            close_failures: HashMap::new(),
            hanging_opens: HashSet::new(),
            scripts: HashMap::new(),
            end_on_close: false,
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn with_partitions(mut self, partitions: &[u16]) -> Self {
        self.partitions = partitions.iter().copied().map(PartitionId).collect();
        self
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    pub fn with_bucket(mut self, bucket_uuid: &str) -> Self {
        self.bucket_uuid = bucket_uuid.to_string();
        self
    }

    pub fn failing_membership(mut self) -> Self {
        self.membership_error = true;
        self
    }

    pub fn without_token_for(mut self, partition: u16) -> Self {
        self.missing_tokens.insert(PartitionId(partition));
        self
    }

    pub fn failing_open(mut self, partition: u16, error: TransportError) -> Self {
        self.open_failures.insert(PartitionId(partition), error);
        self
    }

    pub fn failing_close(mut self, partition: u16, error: TransportError) -> Self {
        self.close_failures.insert(PartitionId(partition), error);
        self
    }

    pub fn hanging_open(mut self, partition: u16) -> Self {
        self.hanging_opens.insert(PartitionId(partition));
        self
    }

    pub fn with_script(mut self, partition: u16, events: Vec<RawEvent>) -> Self {
        self.scripts.insert(PartitionId(partition), events);
        self
    }

    /// Emit a stream end event after each successful close.
    pub fn ending_on_close(mut self) -> Self {
        self.end_on_close = true;
        self
    }

    /// Deliver an event as the transport would.
    pub fn emit(&self, partition: u16, event: RawEvent) {
        self.emit_result(partition, Ok(event));
    }

    pub fn emit_result(&self, partition: u16, event: std::result::Result<RawEvent, TransportError>) {
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer.on_event(PartitionId(partition), event);
        }
    }

    pub fn opened_cursor(&self, partition: u16) -> Option<ResumeCursor> {
        self.opened
            .lock()
            .iter()
            .find(|(p, _, _)| *p == PartitionId(partition))
            .map(|(_, _, cursor)| *cursor)
    }

    /// Resolve every open request held back by [`MockClient::hanging_open`].
    pub fn release_held(&self, result: std::result::Result<(), TransportError>) {
        for resolver in self.held.lock().drain(..) {
            resolver.resolve(result.clone());
        }
    }

    pub fn close_count(&self) -> usize {
        self.closed.lock().len()
    }
}

impl MembershipProvider for MockClient {
    fn owned_partitions(&self) -> Result<Vec<PartitionId>> {
        if self.membership_error {
            return Err(StreamError::Membership("cluster map unavailable".into()));
        }
        Ok(self.partitions.clone())
    }
}

impl RecoveryProvider for MockClient {
    fn recovery_tokens(
        &self,
        partitions: &[PartitionId],
    ) -> Result<HashMap<PartitionId, RecoveryToken>> {
        Ok(partitions
            .iter()
            .filter(|p| !self.missing_tokens.contains(*p))
            .map(|p| (*p, token_for(*p)))
            .collect())
    }
}

impl StreamTransport for MockClient {
    fn open_stream(
        &self,
        partition: PartitionId,
        token: RecoveryToken,
        cursor: ResumeCursor,
        observer: Arc<Observer>,
    ) -> Pending {
        self.opened.lock().push((partition, token, cursor));
        *self.observer.lock() = Some(Arc::clone(&observer));

        if let Some(error) = self.open_failures.get(&partition) {
            return Pending::ready(Err(error.clone()));
        }

        let (resolver, pending) = pending();
        if self.hanging_opens.contains(&partition) {
            self.held.lock().push(resolver);
            return pending;
        }

        let script = self.scripts.get(&partition).cloned().unwrap_or_default();
        thread::spawn(move || {
            resolver.resolve(Ok(()));
            for event in script {
                observer.on_event(partition, Ok(event));
            }
        });

        pending
    }

    fn close_stream(&self, partition: PartitionId) -> Pending {
        if let Some(error) = self.close_failures.get(&partition) {
            return Pending::ready(Err(error.clone()));
        }

        self.closed.lock().push(partition);

        if self.end_on_close {
            let observer = self.observer.lock().clone();
            if let Some(observer) = observer {
                observer.on_event(
                    partition,
                    Ok(RawEvent::StreamEnd {
                        reason: EndReason::Closed,
                    }),
                );
            }
        }

        Pending::ready(Ok(()))
    }
}

impl Identity for MockClient {
    fn bucket_uuid(&self) -> String {
        self.bucket_uuid.clone()
    }

    fn group_name(&self) -> String {
        self.group.clone()
    }
}

/// Memory store counting saves.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryCheckpointStore,
    saves: AtomicUsize,
}

impl CountingStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for CountingStore {
    fn load(&self, group: &str) -> Result<Option<Checkpoint>> {
        self.inner.load(group)
    }

    fn save(&self, group: &str, checkpoint: &Checkpoint) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(group, checkpoint)
    }
}
