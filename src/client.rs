//! Collaborator contracts consumed by the stream orchestrator.
//!
//! The orchestrator never talks to the data store directly. It asks a
//! [`Client`] which partitions it owns, which lineage each partition is on,
//! and to open or close one stream per partition. Open and close requests
//! resolve asynchronously through a one-shot [`Pending`] handle.

use crate::error::{Result, TransportError};
use crate::events::Observer;
use crate::types::{PartitionId, RecoveryToken, ResumeCursor};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Reports the partitions owned by this process.
pub trait MembershipProvider: Send + Sync {
    fn owned_partitions(&self) -> Result<Vec<PartitionId>>;
}

/// Fetches recovery tokens needed to resume after an owner failover.
pub trait RecoveryProvider: Send + Sync {
    /// Tokens for exactly the requested partitions.
    ///
    /// Fails with `StreamError::RecoveryUnavailable` if the full set cannot
    /// be retrieved.
    fn recovery_tokens(
        &self,
        partitions: &[PartitionId],
    ) -> Result<HashMap<PartitionId, RecoveryToken>>;
}

/// Opens and closes per-partition change streams.
pub trait StreamTransport: Send + Sync {
    /// Request a stream for `partition` starting at `cursor`.
    ///
    /// Events for the partition must be delivered to `observer` in the order
    /// the partition produces them.
    fn open_stream(
        &self,
        partition: PartitionId,
        token: RecoveryToken,
        cursor: ResumeCursor,
        observer: Arc<Observer>,
    ) -> Pending;

    /// Request that an open stream be closed.
    fn close_stream(&self, partition: PartitionId) -> Pending;
}

/// Stable identifiers used to scope checkpoints.
pub trait Identity: Send + Sync {
    /// Identifier of the watched dataset.
    fn bucket_uuid(&self) -> String;

    /// Name of the consumer group.
    fn group_name(&self) -> String;
}

/// Everything the orchestrator needs from the outside world.
pub trait Client: MembershipProvider + RecoveryProvider + StreamTransport + Identity {}

impl<T> Client for T where T: MembershipProvider + RecoveryProvider + StreamTransport + Identity {}

/// Create a linked resolver and pending result.
pub fn pending() -> (Resolver, Pending) {
    let (sender, receiver) = bounded(1);
    (Resolver { sender }, Pending { receiver })
}

/// Completing half of an open/close request.
///
/// Dropping a resolver without calling [`Resolver::resolve`] resolves the
/// request as [`TransportError::Disconnected`].
pub struct Resolver {
    sender: Sender<std::result::Result<(), TransportError>>,
}

impl Resolver {
    pub fn resolve(self, result: std::result::Result<(), TransportError>) {
        // Receiver may have given up after a timeout.
        let _ = self.sender.send(result);
    }
}

/// Waiting half of an open/close request. Resolves exactly once.
pub struct Pending {
    receiver: Receiver<std::result::Result<(), TransportError>>,
}

impl Pending {
    /// An already resolved request.
    pub fn ready(result: std::result::Result<(), TransportError>) -> Self {
        let (resolver, pending) = pending();
        resolver.resolve(result);
        pending
    }

    /// Block until the request resolves.
    pub fn wait(&self) -> std::result::Result<(), TransportError> {
        self.receiver
            .recv()
            .unwrap_or(Err(TransportError::Disconnected))
    }

    /// Block until the request resolves or `deadline` passes.
    ///
    /// A timed-out request stays pending and may still be waited on or polled.
    pub fn wait_until(&self, deadline: Option<Instant>) -> std::result::Result<(), TransportError> {
        let Some(deadline) = deadline else {
            return self.wait();
        };

        match self.receiver.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    /// The result if the request has resolved, without blocking.
    pub fn try_wait(&self) -> Option<std::result::Result<(), TransportError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TransportError::Disconnected)),
        }
    }
}
