//! Messages into the mediator event loop.

use std::fmt;

use quizrelay_link::{Inbound, LinkError, PeerHandle};
use serde_json::Value;
use tokio::sync::oneshot;

/// Which peer of the mediator a message concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Host,
    Gateway,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Gateway => "gateway",
        })
    }
}

#[derive(Debug)]
pub enum RelayEvent {
    /// A new connection to `side`. The loop answers on `attached` with the
    /// link generation it assigned, and fires `established` once the
    /// handshake completes. A failed handshake drops `established`.
    Connected {
        side: Side,
        handle: PeerHandle,
        attached: oneshot::Sender<u64>,
        established: oneshot::Sender<()>,
    },
    /// The peer answered (or failed to answer) our `helo`.
    HandshakeReply {
        side: Side,
        generation: u64,
        reply: Result<Value, LinkError>,
        established: oneshot::Sender<()>,
    },
    Inbound {
        side: Side,
        inbound: Inbound,
    },
    Disconnected {
        side: Side,
        generation: u64,
    },
    /// Replay the next queued message for `side`.
    Drain {
        side: Side,
    },
}
