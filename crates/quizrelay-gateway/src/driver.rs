//! Gateway event loop.
//!
//! [`run`] owns the [`GatewayNode`]. Accepted peer connections and audience
//! messages reach it as [`NodeEvent`]s; team replies come back the same way
//! once the master answers.

use quizrelay_core::types::PlayerId;
use quizrelay_link::transport::PeerConnection;
use quizrelay_link::{Inbound, LinkError, PeerHandle};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::AudienceMessage;
use crate::node::{GatewayNode, PendingTeam};
use crate::outbox::Outbox;
use crate::store::KvStore;

#[derive(Debug)]
pub enum NodeEvent {
    PeerConnected {
        conn: u64,
        handle: PeerHandle,
    },
    PeerInbound {
        conn: u64,
        inbound: Inbound,
    },
    PeerDisconnected {
        conn: u64,
    },
    Audience(AudienceMessage),
    /// The master answered (or dropped) a team request.
    TeamReply {
        player: PlayerId,
        requested: String,
        reply: Result<Value, LinkError>,
    },
    /// Replay the next queued master message.
    Drain,
}

/// Process events until cancelled or every sender is gone.
pub async fn run<S: KvStore, O: Outbox>(
    mut node: GatewayNode<S, O>,
    tx: mpsc::UnboundedSender<NodeEvent>,
    mut rx: mpsc::UnboundedReceiver<NodeEvent>,
    cancel: CancellationToken,
) -> GatewayNode<S, O> {
    loop {
        let event = tokio::select! {
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
            () = cancel.cancelled() => break,
        };
        step(&mut node, event, &tx);
    }
    tracing::info!("gateway loop stopped");
    node
}

pub fn step<S: KvStore, O: Outbox>(
    node: &mut GatewayNode<S, O>,
    event: NodeEvent,
    tx: &mpsc::UnboundedSender<NodeEvent>,
) {
    match event {
        NodeEvent::PeerConnected { conn, handle } => node.peer_connected(conn, handle),
        NodeEvent::PeerInbound { conn, inbound } => {
            if node.on_peer(conn, inbound) {
                post(tx, NodeEvent::Drain);
            }
        }
        NodeEvent::PeerDisconnected { conn } => node.peer_disconnected(conn),
        NodeEvent::Audience(msg) => {
            if let Some(pending) = node.on_audience(msg) {
                tokio::spawn(await_team_reply(pending, tx.clone()));
            }
        }
        NodeEvent::TeamReply {
            player,
            requested,
            reply,
        } => node.on_team_reply(player, &requested, reply),
        NodeEvent::Drain => {
            if node.drain_master() {
                post(tx, NodeEvent::Drain);
            }
        }
    }
}

fn post(tx: &mpsc::UnboundedSender<NodeEvent>, event: NodeEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("gateway loop gone, event dropped");
    }
}

/// The request may sit in the offline queue until a master joins, so there
/// is no deadline here.
async fn await_team_reply(pending: PendingTeam, tx: mpsc::UnboundedSender<NodeEvent>) {
    let PendingTeam {
        player,
        requested,
        reply,
    } = pending;
    let reply = reply.await.map_err(|_| LinkError::Closed);
    post(
        &tx,
        NodeEvent::TeamReply {
            player,
            requested,
            reply,
        },
    );
}

/// Register an accepted connection with the loop and pump its messages
/// until it closes or `cancel` fires.
pub async fn serve_peer(
    conn: u64,
    peer: PeerConnection,
    tx: mpsc::UnboundedSender<NodeEvent>,
    cancel: CancellationToken,
) {
    let PeerConnection {
        handle,
        mut inbound,
    } = peer;

    if tx.send(NodeEvent::PeerConnected { conn, handle }).is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = inbound.recv() => match msg {
                Some(inbound) => {
                    if tx.send(NodeEvent::PeerInbound { conn, inbound }).is_err() {
                        return;
                    }
                }
                None => break,
            },
            () = cancel.cancelled() => break,
        }
    }

    tracing::info!(conn, "peer connection ended");
    post(&tx, NodeEvent::PeerDisconnected { conn });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::MemoryOutbox;
    use crate::store::{MemoryStore, Persister};
    use quizrelay_core::protocol::HELO;
    use quizrelay_link::Outgoing;
    use serde_json::json;

    fn node() -> GatewayNode<MemoryStore, MemoryOutbox> {
        let mut store = Persister::new("quiz");
        store.attach(MemoryStore::new());
        GatewayNode::new("AC1", store, MemoryOutbox::new())
    }

    fn sms(from: &str, body: &str) -> NodeEvent {
        NodeEvent::Audience(AudienceMessage {
            account: "AC1".into(),
            from: from.into(),
            body: body.into(),
        })
    }

    #[tokio::test]
    async fn team_reply_comes_back_as_an_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut node = node();

        let (handle, mut master) = PeerHandle::channel();
        step(&mut node, NodeEvent::PeerConnected { conn: 1, handle }, &tx);
        let (helo, mut roster) = Inbound::request(HELO, json!({"ready": false, "number": 0}));
        step(&mut node, NodeEvent::PeerInbound { conn: 1, inbound: helo }, &tx);
        assert_eq!(roster.try_recv().unwrap(), json!({}));

        step(&mut node, sms("+1", "play Alice"), &tx);
        step(&mut node, sms("+1", "team Spartak"), &tx);

        let Ok(Outgoing::Emit(new)) = master.try_recv() else {
            panic!("expected player:new");
        };
        assert_eq!(new.event, "player:new");
        let Ok(Outgoing::Emit(team)) = master.try_recv() else {
            panic!("expected player:team");
        };
        assert_eq!(team.data, json!({"id": "+1", "team": "Spartak"}));
        team.ack
            .unwrap()
            .send(json!({"code": 0, "team": {"id": "+1", "team": "a", "displayName": "Spartak"}}))
            .unwrap();

        let reply = rx.recv().await.unwrap();
        assert!(matches!(reply, NodeEvent::TeamReply { .. }));
        step(&mut node, reply, &tx);
        assert_eq!(
            node.outbox().sent()[0].text,
            "Your favorite team is \"Spartak\"."
        );
    }

    #[tokio::test]
    async fn queued_messages_drain_after_helo() {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(node(), tx.clone(), rx, cancel.clone()));

        tx.send(sms("+1", "play Alice")).unwrap();
        tx.send(sms("+2", "play Bobby")).unwrap();

        let (handle, mut master) = PeerHandle::channel();
        tx.send(NodeEvent::PeerConnected { conn: 3, handle }).unwrap();
        let (helo, _roster) = Inbound::request(HELO, json!({"ready": false, "number": 0}));
        tx.send(NodeEvent::PeerInbound { conn: 3, inbound: helo }).unwrap();
        tx.send(sms("+3", "play Carol")).unwrap();

        let mut names = Vec::new();
        for _ in 0..3 {
            let Some(Outgoing::Emit(m)) = master.recv().await else {
                panic!("expected an emit");
            };
            names.push(m.data["name"].as_str().unwrap().to_owned());
        }
        assert_eq!(names, ["Alice", "Bobby", "Carol"]);

        cancel.cancel();
        task.await.unwrap();
    }
}
