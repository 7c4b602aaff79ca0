//! Mediator event loop and per-peer reconnect loops.
//!
//! [`run`] is the single owner of the [`Relay`]. [`maintain_peer`] keeps one
//! outbound connection alive, feeding the loop with [`RelayEvent`]s and
//! reconnecting with [`Backoff`] whenever the connection drops.

use std::time::Duration;

use quizrelay_link::transport::{self, PeerConnection};
use quizrelay_link::{Backoff, LinkError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::event::{RelayEvent, Side};
use crate::relay::{PendingHandshake, Relay};

/// How long a peer may take to answer our `helo`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Event loop ──────────────────────────────────────────────────────

/// Process events until cancelled or every sender is gone. Returns the
/// relay so callers can inspect the final state.
pub async fn run(
    mut relay: Relay,
    tx: mpsc::UnboundedSender<RelayEvent>,
    mut rx: mpsc::UnboundedReceiver<RelayEvent>,
    cancel: CancellationToken,
) -> Relay {
    loop {
        let event = tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
            () = cancel.cancelled() => break,
        };
        step(&mut relay, event, &tx);
    }
    tracing::info!("relay loop stopped");
    relay
}

/// Apply one event. Follow-up work (drain ticks, handshake replies) is
/// posted back onto `tx` so it queues behind events already waiting.
pub fn step(relay: &mut Relay, event: RelayEvent, tx: &mpsc::UnboundedSender<RelayEvent>) {
    match event {
        RelayEvent::Connected {
            side,
            handle,
            attached,
            established,
        } => match relay.connect(side, handle) {
            Ok(pending) => {
                let _ = attached.send(pending.generation);
                tokio::spawn(await_handshake(pending, established, tx.clone()));
            }
            Err(e) => tracing::warn!(peer = %side, error = %e, "could not start handshake"),
        },

        RelayEvent::HandshakeReply {
            side,
            generation,
            reply,
            established,
        } => {
            let outcome = reply.map_err(Into::into).and_then(|value| {
                relay.complete_handshake(side, generation, value)
            });
            if outcome.is_ok() {
                let _ = established.send(());
            }
            match outcome {
                Ok(true) => post(tx, RelayEvent::Drain { side }),
                Ok(false) => {}
                Err(e) => {
                    let reason = LinkError::Handshake {
                        peer: side.to_string(),
                        reason: e.to_string(),
                    };
                    relay.abandon_handshake(side, generation, &reason);
                }
            }
        }

        RelayEvent::Inbound { side, inbound } => relay.handle_inbound(side, inbound),

        RelayEvent::Disconnected { side, generation } => relay.disconnected(side, generation),

        RelayEvent::Drain { side } => {
            if relay.drain_step(side) {
                post(tx, RelayEvent::Drain { side });
            }
        }
    }
}

fn post(tx: &mpsc::UnboundedSender<RelayEvent>, event: RelayEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("relay loop gone, event dropped");
    }
}

async fn await_handshake(
    pending: PendingHandshake,
    established: oneshot::Sender<()>,
    tx: mpsc::UnboundedSender<RelayEvent>,
) {
    let PendingHandshake {
        side,
        generation,
        reply,
    } = pending;

    let reply = match tokio::time::timeout(HANDSHAKE_TIMEOUT, reply).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(LinkError::Closed),
        Err(_) => Err(LinkError::Handshake {
            peer: side.to_string(),
            reason: format!("no reply within {}s", HANDSHAKE_TIMEOUT.as_secs()),
        }),
    };
    post(
        &tx,
        RelayEvent::HandshakeReply {
            side,
            generation,
            reply,
            established,
        },
    );
}

// ─── Reconnect loop ──────────────────────────────────────────────────

/// Keep a connection to `url` for `side` until cancelled or the event loop
/// is gone. Connection failures are retried with exponential backoff; the
/// delay only starts over once a handshake has completed.
pub async fn maintain_peer(
    side: Side,
    url: String,
    tx: mpsc::UnboundedSender<RelayEvent>,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::default();

    loop {
        let connected = tokio::select! {
            r = transport::connect(&url) => r,
            () = cancel.cancelled() => return,
        };

        match connected {
            Ok(conn) => match serve_connection(side, conn, &tx, &cancel).await {
                Session::Stop => return,
                Session::Ended { established: true } => backoff.reset(),
                Session::Ended { established: false } => {
                    tracing::warn!(peer = %side, attempt = backoff.attempt(), "connection ended before handshake");
                }
            },
            Err(e) => {
                tracing::warn!(peer = %side, error = %e, attempt = backoff.attempt(), "connect failed");
            }
        }

        let delay = backoff.next_delay();
        tracing::info!(peer = %side, retry_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = cancel.cancelled() => return,
        }
    }
}

enum Session {
    /// The connection closed; `established` tells whether its handshake
    /// had completed.
    Ended { established: bool },
    /// Cancelled, or the event loop is gone.
    Stop,
}

/// Hand a fresh connection to the loop and pump its inbound messages until
/// it closes.
async fn serve_connection(
    side: Side,
    conn: PeerConnection,
    tx: &mpsc::UnboundedSender<RelayEvent>,
    cancel: &CancellationToken,
) -> Session {
    let PeerConnection {
        handle,
        mut inbound,
    } = conn;

    let (attached_tx, attached_rx) = oneshot::channel();
    let (established_tx, mut established_rx) = oneshot::channel();
    if tx
        .send(RelayEvent::Connected {
            side,
            handle,
            attached: attached_tx,
            established: established_tx,
        })
        .is_err()
    {
        return Session::Stop;
    }
    let Ok(generation) = attached_rx.await else {
        // Rejected by the loop (or the loop is gone); the dropped handle
        // closes the socket.
        return if tx.is_closed() {
            Session::Stop
        } else {
            Session::Ended { established: false }
        };
    };

    let mut established = false;
    let mut awaiting_handshake = true;
    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Some(inbound) => {
                    if tx.send(RelayEvent::Inbound { side, inbound }).is_err() {
                        return Session::Stop;
                    }
                }
                None => break,
            },
            done = &mut established_rx, if awaiting_handshake => {
                awaiting_handshake = false;
                established = done.is_ok();
            }
            () = cancel.cancelled() => return Session::Stop,
        }
    }

    if awaiting_handshake {
        established = established_rx.try_recv().is_ok();
    }

    if tx.send(RelayEvent::Disconnected { side, generation }).is_err() {
        return Session::Stop;
    }
    Session::Ended { established }
}
