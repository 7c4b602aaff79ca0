//! `quizrelay gateway`: WebSocket listener for the mediator, the audience
//! inbox and the gateway loop.

use quizrelay_gateway::driver;
use quizrelay_gateway::{GatewayNode, LogOutbox, MemoryStore, NodeEvent, Persister};
use quizrelay_link::transport;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::GatewayOpts;
use crate::inbox;

pub async fn run_gateway(opts: GatewayOpts) -> anyhow::Result<()> {
    let mut store = Persister::new(opts.namespace.as_str());
    store.attach(MemoryStore::new());
    let mut node = GatewayNode::new(
        opts.carrier_account.as_str(),
        store,
        LogOutbox::new(opts.carrier_phone.as_str()),
    );
    node.load_players()?;

    let peers = TcpListener::bind(opts.listen).await?;
    let audience = TcpListener::bind(opts.inbox).await?;
    tracing::info!(listen = %opts.listen, inbox = %opts.inbox, "gateway listening");

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel::<NodeEvent>();

    let mut node_handle = tokio::spawn(driver::run(node, tx.clone(), rx, cancel.clone()));
    let mut accept_handle = tokio::spawn(accept_peers(peers, tx.clone(), cancel.clone()));
    let mut inbox_handle = tokio::spawn(inbox::run_inbox(audience, tx, cancel.clone()));

    tokio::select! {
        () = crate::shutdown_signal() => {}
        _ = &mut node_handle => {
            tracing::warn!("gateway loop exited unexpectedly");
        }
        r = &mut accept_handle => {
            tracing::warn!(result = ?r, "peer listener exited unexpectedly");
        }
        r = &mut inbox_handle => {
            tracing::warn!(result = ?r, "inbox exited unexpectedly");
        }
    }

    cancel.cancel();
    accept_handle.abort();
    inbox_handle.abort();
    tracing::info!("gateway stopped");
    Ok(())
}

/// Accept mediator connections. Each connection gets an id; the loop
/// decides which one is the master.
async fn accept_peers(
    listener: TcpListener,
    tx: mpsc::UnboundedSender<NodeEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut next_conn: u64 = 0;
    loop {
        let (stream, addr) = tokio::select! {
            r = listener.accept() => r?,
            () = cancel.cancelled() => return Ok(()),
        };
        next_conn += 1;
        let conn = next_conn;
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match transport::accept(stream, addr.to_string()).await {
                Ok(peer) => driver::serve_peer(conn, peer, tx, cancel).await,
                Err(e) => tracing::warn!(conn, peer = %addr, error = %e, "upgrade failed"),
            }
        });
    }
}
