//! Stream orchestrator tying partition streams together.

use crate::barrier::{CompletionBarrier, Signal};
use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::client::{
    Client, Identity, MembershipProvider, Pending, RecoveryProvider, StreamTransport,
};
use crate::dispatch::{DispatchCounters, DispatchStats, Dispatcher, ListenerRegistry};
use crate::error::{PartitionFailure, PartitionFailures, Result, StreamError, TransportError};
use crate::events::{Event, Observer, DEFAULT_BOOKKEEPING_PREFIX};
use crate::types::{PartitionId, ResumeCursor};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How [`Stream::stop`] issues close requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CloseMode {
    /// Close one partition at a time, waiting for each.
    #[default]
    Sequential,
    /// Request every close up front, then wait for all of them.
    Parallel,
}

/// Stream configuration.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Key prefix of documents treated as bookkeeping.
    pub bookkeeping_prefix: String,

    /// How open partitions are closed on stop.
    pub close_mode: CloseMode,

    /// Longest time start waits for the open requests (None = forever).
    pub open_timeout: Option<Duration>,

    /// Longest time stop waits for a close request (None = forever).
    pub close_timeout: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bookkeeping_prefix: DEFAULT_BOOKKEEPING_PREFIX.to_string(),
            close_mode: CloseMode::Sequential,
            open_timeout: None,
            close_timeout: None,
        }
    }
}

/// Which partitions have a live stream.
///
/// Slots are indexed by the partition's position in the owned set, so each
/// open request writes only its own slot.
struct OpenSlots {
    partitions: Vec<PartitionId>,
    open: Vec<AtomicBool>,
}

impl OpenSlots {
    fn new(partitions: Vec<PartitionId>) -> Self {
        let open = partitions.iter().map(|_| AtomicBool::new(false)).collect();
        Self { partitions, open }
    }

    fn mark_open(&self, index: usize) {
        self.open[index].store(true, Ordering::Release);
    }

    fn mark_closed(&self, partition: PartitionId) {
        if let Ok(index) = self.partitions.binary_search(&partition) {
            self.open[index].store(false, Ordering::Release);
        }
    }

    fn open_partitions(&self) -> Vec<PartitionId> {
        self.partitions
            .iter()
            .zip(&self.open)
            .filter(|(_, open)| open.load(Ordering::Acquire))
            .map(|(p, _)| *p)
            .collect()
    }
}

/// State of one start/wait/stop run.
struct Session {
    slots: OpenSlots,
    observer: Arc<Observer>,
    barrier: Arc<CompletionBarrier>,
    checkpoints: CheckpointManager,
    /// Set once wait has saved the final checkpoint. Held across every save.
    completion_saved: Mutex<bool>,
    /// Open requests that missed the open timeout, by slot index.
    late_opens: Mutex<Vec<(usize, PartitionId, Pending)>>,
}

impl Session {
    /// Move late opens that have since resolved into the open set.
    fn reap_late_opens(&self) {
        self.late_opens.lock().retain(|(index, partition, pending)| {
            match pending.try_wait() {
                None => true,
                Some(Ok(())) => {
                    self.slots.mark_open(*index);
                    info!(partition = %partition, "partition stream opened after timeout");
                    false
                }
                Some(Err(error)) => {
                    debug!(partition = %partition, %error, "late open request failed");
                    false
                }
            }
        });
    }
}

/// Orchestrates the streams of every partition owned by this process.
///
/// Typical use:
///
/// ```ignore
/// let stream = Stream::new(client, store, StreamConfig::default());
/// stream.add_listener(|event| println!("{:?}", event.kind));
/// stream.start()?;
/// stream.wait()?;
/// ```
///
/// Listeners may be added at any time; a listener sees every event dispatched
/// after it is registered. One `Stream` drives a single run. Nothing carries
/// over to the next run except the saved checkpoint.
pub struct Stream {
    client: Arc<dyn Client>,
    store: Arc<dyn CheckpointStore>,
    config: StreamConfig,
    listeners: Arc<ListenerRegistry>,
    counters: Arc<DispatchCounters>,
    session: RwLock<Option<Arc<Session>>>,
    /// Serializes start.
    start_lock: Mutex<()>,
}

impl Stream {
    /// Create a stream over `client`, persisting cursors to `store`.
    pub fn new(
        client: Arc<dyn Client>,
        store: Arc<dyn CheckpointStore>,
        config: StreamConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
            listeners: Arc::new(ListenerRegistry::default()),
            counters: Arc::new(DispatchCounters::default()),
            session: RwLock::new(None),
            start_lock: Mutex::new(()),
        }
    }

    /// Create a stream with one listener already registered.
    pub fn with_listener<F>(
        client: Arc<dyn Client>,
        store: Arc<dyn CheckpointStore>,
        config: StreamConfig,
        listener: F,
    ) -> Self
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let stream = Self::new(client, store, config);
        stream.add_listener(listener);
        stream
    }

    /// Register a listener for every subsequent non-bookkeeping event.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener));
    }

    /// Open a stream for every owned partition.
    ///
    /// Returns once every open request has resolved. Partitions that failed
    /// to open are reported in [`StreamError::PartitionOpen`]; the rest stay
    /// open and the failed ones no longer hold up [`Stream::wait`].
    pub fn start(&self) -> Result<()> {
        let _lock = self.start_lock.lock();
        if self.session.read().is_some() {
            return Err(StreamError::AlreadyStarted);
        }

        let mut partitions = self.client.owned_partitions()?;
        partitions.sort_unstable();
        partitions.dedup();

        let group = self.client.group_name();
        info!(group = %group, partitions = partitions.len(), "starting stream");

        let tokens = self.client.recovery_tokens(&partitions)?;
        let missing: Vec<_> = partitions
            .iter()
            .filter(|p| !tokens.contains_key(*p))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(StreamError::RecoveryUnavailable(format!(
                "no recovery token for partitions {:?}",
                missing
            )));
        }

        let checkpoints =
            CheckpointManager::new(Arc::clone(&self.store), group, self.client.bucket_uuid());
        let mut cursors = checkpoints.load(&partitions)?;
        for (partition, cursor) in cursors.iter_mut() {
            cursor.token = tokens[partition];
        }

        let barrier = Arc::new(CompletionBarrier::new(&partitions));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.listeners),
            Arc::clone(&barrier),
            Arc::clone(&self.counters),
        ));
        let observer = Arc::new(Observer::new(
            cursors.clone(),
            self.config.bookkeeping_prefix.as_bytes(),
            dispatcher,
        ));

        // Every request goes out before any is awaited.
        let requests: Vec<(PartitionId, Pending)> = partitions
            .iter()
            .map(|p| {
                let cursor = cursors.get(p).copied().unwrap_or_else(ResumeCursor::beginning);
                let pending = self
                    .client
                    .open_stream(*p, tokens[p], cursor, Arc::clone(&observer));
                (*p, pending)
            })
            .collect();

        let slots = OpenSlots::new(partitions);
        let deadline = self.config.open_timeout.map(|t| Instant::now() + t);
        let mut failures = Vec::new();
        let mut late_opens = Vec::new();

        for (index, (partition, pending)) in requests.into_iter().enumerate() {
            match pending.wait_until(deadline) {
                Ok(()) => {
                    slots.mark_open(index);
                    debug!(partition = %partition, "opened partition stream");
                }
                Err(error) => {
                    warn!(partition = %partition, %error, "failed to open partition stream");
                    barrier.signal(partition);
                    if error == TransportError::Timeout {
                        late_opens.push((index, partition, pending));
                    }
                    failures.push(PartitionFailure { partition, error });
                }
            }
        }

        let opened = slots.open_partitions().len();
        *self.session.write() = Some(Arc::new(Session {
            slots,
            observer,
            barrier,
            checkpoints,
            completion_saved: Mutex::new(false),
            late_opens: Mutex::new(late_opens),
        }));

        if !failures.is_empty() {
            return Err(StreamError::PartitionOpen {
                failures: PartitionFailures(failures),
            });
        }

        info!(opened, "stream started");
        Ok(())
    }

    /// Block until every partition has completed, then save the checkpoint.
    ///
    /// The checkpoint is saved by the first call that sees completion; later
    /// calls return immediately.
    pub fn wait(&self) -> Result<()> {
        let session = self.session()?;
        session.barrier.wait();
        self.save_on_completion(&session)
    }

    /// Like [`Stream::wait`], giving up after `timeout`.
    ///
    /// Returns false if partitions were still outstanding.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        let session = self.session()?;
        if !session.barrier.wait_timeout(timeout) {
            return Ok(false);
        }
        self.save_on_completion(&session)?;
        Ok(true)
    }

    fn save_on_completion(&self, session: &Session) -> Result<()> {
        let mut saved = session.completion_saved.lock();
        if *saved {
            return Ok(());
        }

        session.checkpoints.save(session.observer.cursors())?;
        *saved = true;
        info!(group = %session.checkpoints.group(), "all partitions completed");
        Ok(())
    }

    /// Persist the current cursor of every partition.
    ///
    /// Safe to call from any thread, including while another thread waits.
    pub fn save_checkpoint(&self) -> Result<()> {
        let session = self.session()?;
        let _saved = session.completion_saved.lock();
        session.checkpoints.save(session.observer.cursors())
    }

    /// Close every open partition stream.
    ///
    /// Returns after every close request has resolved. A successful close
    /// completes the partition; partitions that failed to close stay open
    /// and are reported in [`StreamError::PartitionClose`]. A partition that
    /// already ended is closed even if the transport rejects the request.
    ///
    /// Open requests that timed out during start are closed too: those that
    /// have since succeeded like any open partition, those still unresolved
    /// on a best-effort basis.
    pub fn stop(&self) -> Result<()> {
        let Some(session) = self.session.read().clone() else {
            return Ok(());
        };

        session.reap_late_opens();
        self.close_unresolved_opens(&session);

        let open = session.slots.open_partitions();
        if open.is_empty() {
            return Ok(());
        }

        info!(partitions = open.len(), mode = ?self.config.close_mode, "stopping stream");
        let mut failures = Vec::new();

        match self.config.close_mode {
            CloseMode::Sequential => {
                for partition in open {
                    let result = self
                        .client
                        .close_stream(partition)
                        .wait_until(self.close_deadline());
                    Self::finish_close(&session, partition, result, &mut failures);
                }
            }
            CloseMode::Parallel => {
                let requests: Vec<_> = open
                    .into_iter()
                    .map(|p| (p, self.client.close_stream(p)))
                    .collect();
                let deadline = self.close_deadline();
                for (partition, pending) in requests {
                    let result = pending.wait_until(deadline);
                    Self::finish_close(&session, partition, result, &mut failures);
                }
            }
        }

        if !failures.is_empty() {
            return Err(StreamError::PartitionClose {
                failures: PartitionFailures(failures),
            });
        }

        info!("stream stopped");
        Ok(())
    }

    /// Close partitions whose open request is still unresolved.
    ///
    /// Failures are logged only; such partitions were already reported by start.
    fn close_unresolved_opens(&self, session: &Session) {
        let unresolved = std::mem::take(&mut *session.late_opens.lock());
        for (_, partition, _) in unresolved {
            match self
                .client
                .close_stream(partition)
                .wait_until(self.close_deadline())
            {
                Ok(()) => debug!(partition = %partition, "closed unresolved partition stream"),
                Err(error) => {
                    debug!(partition = %partition, %error, "could not close unresolved partition stream")
                }
            }
        }
    }

    fn close_deadline(&self) -> Option<Instant> {
        self.config.close_timeout.map(|t| Instant::now() + t)
    }

    fn finish_close(
        session: &Session,
        partition: PartitionId,
        result: std::result::Result<(), TransportError>,
        failures: &mut Vec<PartitionFailure>,
    ) {
        match result {
            Ok(()) => {
                session.slots.mark_closed(partition);
                if session.barrier.signal(partition) == Signal::AlreadyCompleted {
                    debug!(partition = %partition, "closed partition had already ended");
                } else {
                    debug!(partition = %partition, "closed partition stream");
                }
            }
            Err(error) if session.barrier.is_complete(partition) => {
                session.slots.mark_closed(partition);
                debug!(partition = %partition, %error, "close rejected for partition that already ended");
            }
            Err(error) => {
                warn!(partition = %partition, %error, "failed to close partition stream");
                failures.push(PartitionFailure { partition, error });
            }
        }
    }

    /// Partitions with a live stream.
    ///
    /// Includes partitions whose open request resolved after the open timeout.
    pub fn open_partitions(&self) -> Vec<PartitionId> {
        self.session
            .read()
            .as_ref()
            .map(|s| {
                s.reap_late_opens();
                s.slots.open_partitions()
            })
            .unwrap_or_default()
    }

    /// Partitions still expected to complete.
    pub fn outstanding(&self) -> usize {
        self.session
            .read()
            .as_ref()
            .map(|s| s.barrier.remaining())
            .unwrap_or(0)
    }

    /// Current cursor of every owned partition.
    pub fn cursors(&self) -> BTreeMap<PartitionId, ResumeCursor> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.observer.cursors())
            .unwrap_or_default()
    }

    /// Counters of dispatched and skipped events.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// The configuration this stream was created with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.session.read().clone().ok_or(StreamError::NotStarted)
    }
}
