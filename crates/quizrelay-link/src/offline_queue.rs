//! Per-peer FIFO of operations waiting for a reachable peer.
//!
//! Entries leave the queue only after a successful dispatch. A failed
//! dispatch hands the operation back and it returns to the head, so the
//! replay order is always the enqueue order.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug)]
pub struct QueueEntry<T> {
    pub op: T,
    pub enqueued_at: DateTime<Utc>,
}

/// Outcome of a single [`OfflineQueue::drain_one`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStep {
    /// The head entry was dispatched and removed.
    Dispatched,
    /// Nothing to do.
    Empty,
    /// Dispatch failed; the entry is back at the head.
    Stalled,
}

#[derive(Debug)]
pub struct OfflineQueue<T> {
    entries: VecDeque<QueueEntry<T>>,
}

impl<T> Default for OfflineQueue<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T> OfflineQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, op: T) {
        self.entries.push_back(QueueEntry {
            op,
            enqueued_at: Utc::now(),
        });
    }

    /// Dispatch the head entry. `dispatch` returns the operation on
    /// failure so it can be put back untouched.
    pub fn drain_one<F>(&mut self, dispatch: F) -> DrainStep
    where
        F: FnOnce(T) -> Result<(), T>,
    {
        let Some(QueueEntry { op, enqueued_at }) = self.entries.pop_front() else {
            return DrainStep::Empty;
        };
        match dispatch(op) {
            Ok(()) => DrainStep::Dispatched,
            Err(op) => {
                self.entries.push_front(QueueEntry { op, enqueued_at });
                DrainStep::Stalled
            }
        }
    }

    /// Dispatch entries in order until the queue is empty or a dispatch
    /// fails. Returns the number dispatched.
    pub fn drain<F>(&mut self, mut dispatch: F) -> usize
    where
        F: FnMut(T) -> Result<(), T>,
    {
        let mut sent = 0;
        while self.drain_one(&mut dispatch) == DrainStep::Dispatched {
            sent += 1;
        }
        sent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Age of the head entry relative to `now`.
    pub fn oldest_age(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.entries.front().map(|e| now - e.enqueued_at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.op)
    }
}
