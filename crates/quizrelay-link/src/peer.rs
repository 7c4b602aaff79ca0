//! Owner-side handles onto a peer connection.
//!
//! The connection task owns the socket. The owner talks to it through a
//! [`PeerHandle`] (outgoing) and receives [`Inbound`] messages (incoming).
//! Acknowledgments travel as `oneshot` channels: the sender of a request
//! keeps the receiver, the responder of an inbound request consumes its
//! [`Responder`] exactly once.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::LinkError;

// ─── Outgoing ─────────────────────────────────────────────────────

/// A message to a peer, optionally waiting for its acknowledgment.
#[derive(Debug)]
pub struct Outbound {
    pub event: String,
    pub data: Value,
    pub ack: Option<oneshot::Sender<Value>>,
}

impl Outbound {
    pub fn event(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            ack: None,
        }
    }

    /// A request; the returned receiver resolves with the peer's reply.
    pub fn with_ack(event: impl Into<String>, data: Value) -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        let msg = Self {
            event: event.into(),
            data,
            ack: Some(tx),
        };
        (msg, rx)
    }
}

/// What the connection task writes to the socket.
#[derive(Debug)]
pub enum Outgoing {
    Emit(Outbound),
    Reply { id: u64, data: Value },
}

/// Cloneable sender into one connection task.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl PeerHandle {
    /// A handle plus the receiving end a connection task (or a test) reads.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self { tx }
    }

    /// Hand a message to the connection. Gives the message back if the
    /// connection is gone.
    pub fn dispatch(&self, msg: Outbound) -> Result<(), Outbound> {
        match self.tx.send(Outgoing::Emit(msg)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(Outgoing::Emit(msg))) => Err(msg),
            Err(mpsc::error::SendError(Outgoing::Reply { .. })) => {
                unreachable!("dispatch only sends Emit")
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the connection task has stopped reading.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    pub fn same_peer(&self, other: &PeerHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

// ─── Incoming ─────────────────────────────────────────────────────

#[derive(Debug)]
enum ReplyTarget {
    Remote {
        id: u64,
        tx: mpsc::UnboundedSender<Outgoing>,
    },
    Local(oneshot::Sender<Value>),
}

/// One-shot reply slot for an inbound request.
#[derive(Debug)]
pub struct Responder {
    target: ReplyTarget,
}

impl Responder {
    pub(crate) fn remote(id: u64, tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            target: ReplyTarget::Remote { id, tx },
        }
    }

    /// A responder that resolves an in-process receiver.
    pub fn local() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                target: ReplyTarget::Local(tx),
            },
            rx,
        )
    }

    pub fn reply<T: Serialize>(self, payload: &T) -> Result<(), LinkError> {
        self.reply_value(serde_json::to_value(payload)?)
    }

    pub fn reply_value(self, data: Value) -> Result<(), LinkError> {
        match self.target {
            ReplyTarget::Remote { id, tx } => tx
                .send(Outgoing::Reply { id, data })
                .map_err(|_| LinkError::Closed),
            ReplyTarget::Local(tx) => tx.send(data).map_err(|_| LinkError::Closed),
        }
    }
}

/// A message received from a peer.
#[derive(Debug)]
pub struct Inbound {
    pub event: String,
    pub data: Value,
    /// Present when the peer asked for an acknowledgment.
    pub responder: Option<Responder>,
}

impl Inbound {
    pub fn notify(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            responder: None,
        }
    }

    /// An in-process request; the receiver resolves with the reply.
    pub fn request(event: impl Into<String>, data: Value) -> (Self, oneshot::Receiver<Value>) {
        let (responder, rx) = Responder::local();
        let msg = Self {
            event: event.into(),
            data,
            responder: Some(responder),
        };
        (msg, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatch_reaches_receiver() {
        let (handle, mut rx) = PeerHandle::channel();
        handle
            .dispatch(Outbound::event("state", json!({"ready": true})))
            .unwrap();
        match rx.try_recv().unwrap() {
            Outgoing::Emit(msg) => assert_eq!(msg.event, "state"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dispatch_to_closed_peer_returns_message() {
        let (handle, rx) = PeerHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        let back = handle
            .dispatch(Outbound::event("player:new", json!({"id": "X"})))
            .unwrap_err();
        assert_eq!(back.event, "player:new");
        assert_eq!(back.data["id"], "X");
    }

    #[test]
    fn same_peer_tracks_clones() {
        let (a, _rx_a) = PeerHandle::channel();
        let (b, _rx_b) = PeerHandle::channel();
        assert!(a.same_peer(&a.clone()));
        assert!(!a.same_peer(&b));
    }

    #[test]
    fn remote_responder_writes_reply_frame() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Responder::remote(3, tx).reply(&json!({"code": 0})).unwrap();
        match rx.try_recv().unwrap() {
            Outgoing::Reply { id, data } => {
                assert_eq!(id, 3);
                assert_eq!(data["code"], 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn local_request_resolves() {
        let (msg, mut rx) = Inbound::request("player:team", json!({}));
        msg.responder.unwrap().reply(&json!({"code": 404})).unwrap();
        assert_eq!(rx.try_recv().unwrap(), json!({"code": 404}));
    }
}
