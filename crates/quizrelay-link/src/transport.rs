//! WebSocket transport: one task per connection.
//!
//! The task owns the socket and the table of pending acknowledgments. It
//! stops when the peer closes, on a socket error, or once every
//! [`PeerHandle`] for it has been dropped. When it stops the inbound
//! channel closes, which is how the owner learns about the disconnect.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::error::LinkError;
use crate::frame::Frame;
use crate::peer::{Inbound, Outbound, Outgoing, PeerHandle, Responder};

/// Owner side of a live connection.
#[derive(Debug)]
pub struct PeerConnection {
    pub handle: PeerHandle,
    pub inbound: mpsc::UnboundedReceiver<Inbound>,
}

/// Dial a peer. Fails with [`LinkError::Connection`] when the peer is
/// unreachable or refuses the upgrade.
pub async fn connect(url: &str) -> Result<PeerConnection, LinkError> {
    let (ws, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| LinkError::Connection {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
    tracing::info!(peer = %url, "link: connected");
    Ok(spawn_connection(ws, url.to_owned()))
}

/// Complete the server side of a WebSocket upgrade on an accepted socket.
pub async fn accept(stream: TcpStream, label: String) -> Result<PeerConnection, LinkError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    tracing::info!(peer = %label, "link: accepted");
    Ok(spawn_connection(ws, label))
}

fn spawn_connection<S>(ws: WebSocketStream<S>, label: String) -> PeerConnection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    // Responders only hold a weak sender so dropping every handle still
    // ends the connection.
    let replies = out_tx.downgrade();

    tokio::spawn(async move {
        match run_connection(ws, out_rx, in_tx, replies).await {
            Ok(()) => tracing::info!(peer = %label, "link: connection closed"),
            Err(e) => tracing::warn!(peer = %label, error = %e, "link: connection failed"),
        }
    });

    PeerConnection {
        handle: PeerHandle::from_sender(out_tx),
        inbound: in_rx,
    }
}

async fn run_connection<S>(
    ws: WebSocketStream<S>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    inbound: mpsc::UnboundedSender<Inbound>,
    replies: mpsc::WeakUnboundedSender<Outgoing>,
) -> Result<(), LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, oneshot::Sender<Value>> = HashMap::new();
    let mut next_ack: u64 = 1;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };

                let text = match msg {
                    Message::Text(t) => t,
                    Message::Close(_) => return Ok(()),
                    Message::Ping(data) => {
                        ws_tx.send(Message::Pong(data)).await?;
                        continue;
                    }
                    _ => continue,
                };

                let frame = match Frame::decode(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "link: dropping undecodable frame");
                        continue;
                    }
                };

                match frame {
                    Frame::Event { event, data, ack } => {
                        let responder = ack
                            .and_then(|id| replies.upgrade().map(|tx| Responder::remote(id, tx)));
                        if inbound.send(Inbound { event, data, responder }).is_err() {
                            // Owner is gone.
                            return Ok(());
                        }
                    }
                    Frame::Ack { id, data } => match pending.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(data);
                        }
                        None => tracing::debug!(ack = id, "link: ack for unknown request"),
                    },
                }
            }

            out = outgoing.recv() => {
                let Some(out) = out else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                };
                let frame = match out {
                    Outgoing::Emit(Outbound { event, data, ack }) => {
                        let ack = ack.map(|tx| {
                            let id = next_ack;
                            next_ack += 1;
                            pending.insert(id, tx);
                            id
                        });
                        Frame::Event { event, data, ack }
                    }
                    Outgoing::Reply { id, data } => Frame::Ack { id, data },
                };
                ws_tx.send(Message::Text(frame.encode()?)).await?;
            }
        }
    }
}
