//! The mediator loop against fake host and gateway servers on real sockets.

use std::time::Duration;

use quizrelay_link::transport::{self, PeerConnection};
use quizrelay_link::{Inbound, Outbound};
use quizrelay_relay::{Relay, RelayEvent, Side, driver};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> PeerConnection {
    let (stream, peer) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    transport::accept(stream, peer.to_string()).await.unwrap()
}

async fn next(conn: &mut PeerConnection) -> Inbound {
    timeout(WAIT, conn.inbound.recv()).await.unwrap().unwrap()
}

#[tokio::test]
async fn mediator_relays_between_real_peers() {
    let (host_listener, host_url) = listen().await;
    let (gateway_listener, gateway_url) = listen().await;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel::<RelayEvent>();
    let relay_task = tokio::spawn(driver::run(Relay::new(), tx.clone(), rx, cancel.clone()));
    tokio::spawn(driver::maintain_peer(Side::Host, host_url, tx.clone(), cancel.clone()));
    tokio::spawn(driver::maintain_peer(
        Side::Gateway,
        gateway_url,
        tx.clone(),
        cancel.clone(),
    ));

    // Host handshake.
    let mut host = accept(&host_listener).await;
    let helo = next(&mut host).await;
    assert_eq!(helo.event, "helo");
    assert_eq!(helo.data, json!({"me": "admin"}));
    helo.responder
        .unwrap()
        .reply(&json!({"teams": {"a": {"short": "Spartak", "keyword": "spartak"}}}))
        .unwrap();
    assert_eq!(next(&mut host).await.event, "players:dump");

    // Gateway handshake.
    let mut gateway = accept(&gateway_listener).await;
    let helo = next(&mut gateway).await;
    assert_eq!(helo.event, "helo");
    helo.responder.unwrap().reply(&json!({})).unwrap();

    // Host opens a round; the gateway hears about it.
    host.handle
        .dispatch(Outbound::event("on", json!({"item": "question", "number": 5})))
        .unwrap();
    let mut state = next(&mut gateway).await;
    // The post-handshake snapshot may arrive first.
    if state.data["ready"] == false {
        state = next(&mut gateway).await;
    }
    assert_eq!(state.event, "state");
    assert_eq!(state.data, json!({"ready": true, "number": 5}));

    // Gateway registers a player and picks a team.
    gateway
        .handle
        .dispatch(Outbound::event("player:new", json!({"id": "+1", "name": "Alice"})))
        .unwrap();
    let (req, reply) = Outbound::with_ack("player:team", json!({"id": "+1", "team": "SPARTAK"}));
    gateway.handle.dispatch(req).unwrap();
    let reply = timeout(WAIT, reply).await.unwrap().unwrap();
    assert_eq!(reply["code"], 0);
    assert_eq!(reply["team"]["displayName"], "Spartak");

    assert_eq!(next(&mut host).await.event, "player:new");
    assert_eq!(next(&mut host).await.event, "player:team");

    // Gateway drops; on reconnect the new helo carries the current round.
    drop(gateway);
    host.handle
        .dispatch(Outbound::event("on", json!({"item": "question", "number": 6})))
        .unwrap();
    let mut gateway = accept(&gateway_listener).await;
    let helo = next(&mut gateway).await;
    assert_eq!(helo.event, "helo");
    assert_eq!(helo.data, json!({"ready": true, "number": 6}));

    cancel.cancel();
    let relay = timeout(WAIT, relay_task).await.unwrap().unwrap();
    assert_eq!(relay.registry().player_count(), 1);
}

/// Drive one handshake through `driver::step` and report whether the
/// connection was told it is established.
async fn handshake_with(reply: serde_json::Value) -> bool {
    use quizrelay_link::{Outgoing, PeerHandle};
    use tokio::sync::oneshot;

    let mut relay = Relay::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, mut host) = PeerHandle::channel();
    let (attached, _generation) = oneshot::channel();
    let (established, mut established_rx) = oneshot::channel();
    driver::step(
        &mut relay,
        RelayEvent::Connected {
            side: Side::Host,
            handle,
            attached,
            established,
        },
        &tx,
    );

    let Some(Outgoing::Emit(helo)) = host.recv().await else {
        panic!("expected helo");
    };
    helo.ack.unwrap().send(reply).unwrap();
    let event = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(matches!(event, RelayEvent::HandshakeReply { .. }));
    driver::step(&mut relay, event, &tx);

    established_rx.try_recv().is_ok()
}

#[tokio::test]
async fn only_a_completed_handshake_counts_as_established() {
    assert!(handshake_with(json!({"teams": {}})).await);
    assert!(!handshake_with(json!({"teams": 3})).await);
}
