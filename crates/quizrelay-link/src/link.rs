//! Reconnect-aware link to one peer.
//!
//! ```text
//!   Disconnected ──attach──▶ Handshaking ──complete_handshake──▶ Draining ──queue empty──▶ Live
//!        ▲                        │                                  │                      │
//!        └──────────── detach / dispatch failure ────────────────────┴──────────────────────┘
//! ```
//!
//! Only `Live` dispatches immediately. Every other state appends to the
//! offline queue, so a message sent after a reconnect can never overtake
//! one queued before it.

use std::fmt;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::offline_queue::{DrainStep, OfflineQueue};
use crate::peer::{Outbound, PeerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Handshaking,
    Draining,
    Live,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Handshaking => "handshaking",
            Self::Draining => "draining",
            Self::Live => "live",
        })
    }
}

#[derive(Debug)]
pub struct Link {
    peer: String,
    state: LinkState,
    handle: Option<PeerHandle>,
    /// Bumped on every attach; signals tagged with an older value are stale.
    generation: u64,
    queue: OfflineQueue<Outbound>,
}

impl Link {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            state: LinkState::Disconnected,
            handle: None,
            generation: 0,
            queue: OfflineQueue::new(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Adopt a fresh connection. The link stays unusable until
    /// [`Link::complete_handshake`] is called with the returned generation.
    pub fn attach(&mut self, handle: PeerHandle) -> u64 {
        self.generation += 1;
        self.handle = Some(handle);
        self.state = LinkState::Handshaking;
        tracing::info!(
            peer = %self.peer,
            generation = self.generation,
            queued = self.queue.len(),
            "link: attached, handshaking"
        );
        self.generation
    }

    /// Finish the handshake for `generation`. Returns `true` when the queue
    /// needs draining. Stale generations are ignored.
    pub fn complete_handshake(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != LinkState::Handshaking {
            tracing::debug!(peer = %self.peer, generation, "link: stale handshake ignored");
            return false;
        }
        if self.queue.is_empty() {
            self.state = LinkState::Live;
            tracing::info!(peer = %self.peer, "link: live");
            false
        } else {
            self.state = LinkState::Draining;
            tracing::info!(
                peer = %self.peer,
                queued = self.queue.len(),
                oldest_ms = self.queue.oldest_age(Utc::now()).map(|d| d.num_milliseconds()),
                "link: replaying offline queue"
            );
            true
        }
    }

    /// Drop the connection for `generation`. The queue is kept. Returns
    /// `false` for a stale generation.
    pub fn detach(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if self.handle.take().is_some() {
            tracing::warn!(peer = %self.peer, queued = self.queue.len(), "link: disconnected");
        }
        self.state = LinkState::Disconnected;
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.handle.is_some()
    }

    // ── Sending ─────────────────────────────────────────────────────

    /// Send now if live, otherwise queue for replay.
    pub fn send(&mut self, msg: Outbound) {
        if self.state != LinkState::Live {
            self.queue.enqueue(msg);
            return;
        }
        let Some(handle) = self.handle.as_ref() else {
            self.queue.enqueue(msg);
            return;
        };
        if let Err(msg) = handle.dispatch(msg) {
            self.queue.enqueue(msg);
            self.lost();
        }
    }

    pub fn emit(&mut self, event: &str, data: Value) {
        self.send(Outbound::event(event, data));
    }

    /// Send a request; the receiver resolves with the peer's reply, which
    /// may happen after a reconnect if the request had to wait.
    pub fn request(&mut self, event: &str, data: Value) -> oneshot::Receiver<Value> {
        let (msg, reply) = Outbound::with_ack(event, data);
        self.send(msg);
        reply
    }

    /// Dispatch on the attached connection regardless of state, bypassing
    /// the queue. Used for handshake traffic. Gives the message back when
    /// nothing is attached or the connection is gone.
    pub fn dispatch_now(&mut self, msg: Outbound) -> Result<(), Outbound> {
        let Some(handle) = self.handle.as_ref() else {
            return Err(msg);
        };
        match handle.dispatch(msg) {
            Ok(()) => Ok(()),
            Err(msg) => {
                self.lost();
                Err(msg)
            }
        }
    }

    /// Replay one queued message. Moves to `Live` once the queue is empty.
    pub fn drain_step(&mut self) -> DrainStep {
        if self.state != LinkState::Draining {
            return DrainStep::Empty;
        }
        let Some(handle) = self.handle.as_ref() else {
            return DrainStep::Empty;
        };
        let step = self.queue.drain_one(|msg| handle.dispatch(msg));
        match step {
            DrainStep::Stalled => self.lost(),
            DrainStep::Dispatched | DrainStep::Empty if self.queue.is_empty() => {
                self.state = LinkState::Live;
                tracing::info!(peer = %self.peer, "link: replay done, live");
            }
            _ => {}
        }
        step
    }

    fn lost(&mut self) {
        self.handle = None;
        self.state = LinkState::Disconnected;
        tracing::warn!(peer = %self.peer, queued = self.queue.len(), "link: connection lost");
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_usable(&self) -> bool {
        self.state == LinkState::Live
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
