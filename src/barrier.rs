//! Completion barrier with exactly-once signalling per partition.
//!
//! A partition completes either because its stream emitted end-of-stream or
//! because it was closed (or never opened). Whichever happens first flips the
//! partition's slot; later signals for the same partition are ignored, so the
//! remaining count can never go negative or be decremented twice.

use crate::types::PartitionId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Outcome of a completion signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The partition's slot flipped; the remaining count dropped by one.
    Completed,
    /// The partition had already completed.
    AlreadyCompleted,
    /// The partition is not tracked by this barrier.
    Unknown,
}

struct BarrierState {
    /// Completion flag per tracked partition.
    done: HashMap<PartitionId, bool>,
    remaining: usize,
}

/// Blocks waiters until every tracked partition has completed.
pub struct CompletionBarrier {
    state: Mutex<BarrierState>,
    all_done: Condvar,
}

impl CompletionBarrier {
    /// Track the given partitions. Duplicates are tracked once.
    pub fn new(partitions: &[PartitionId]) -> Self {
        let done: HashMap<PartitionId, bool> = partitions.iter().map(|p| (*p, false)).collect();
        let remaining = done.len();

        Self {
            state: Mutex::new(BarrierState { done, remaining }),
            all_done: Condvar::new(),
        }
    }

    /// Mark a partition complete.
    pub fn signal(&self, partition: PartitionId) -> Signal {
        let mut state = self.state.lock();

        let outcome = match state.done.get_mut(&partition) {
            None => Signal::Unknown,
            Some(true) => Signal::AlreadyCompleted,
            Some(flag) => {
                *flag = true;
                Signal::Completed
            }
        };

        if outcome == Signal::Completed {
            state.remaining -= 1;
            if state.remaining == 0 {
                self.all_done.notify_all();
            }
        }

        outcome
    }

    /// Number of partitions still outstanding.
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }

    pub fn is_complete(&self, partition: PartitionId) -> bool {
        self.state.lock().done.get(&partition).copied().unwrap_or(false)
    }

    /// Block until every partition has completed.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.remaining > 0 {
            self.all_done.wait(&mut state);
        }
    }

    /// Block until every partition has completed or `timeout` elapses.
    /// Returns true if the barrier completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.remaining > 0 {
            if self.all_done.wait_until(&mut state, deadline).timed_out() {
                return state.remaining == 0;
            }
        }
        true
    }
}
