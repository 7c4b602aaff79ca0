//! `quizrelay mediator`: the relay loop plus one reconnect loop per peer.

use quizrelay_relay::driver;
use quizrelay_relay::{Relay, RelayEvent, Side};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::MediatorOpts;

pub async fn run_mediator(opts: MediatorOpts) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel::<RelayEvent>();

    let mut relay_handle = tokio::spawn(driver::run(Relay::new(), tx.clone(), rx, cancel.clone()));
    let host = tokio::spawn(driver::maintain_peer(
        Side::Host,
        opts.host_url,
        tx.clone(),
        cancel.clone(),
    ));
    let gateway = tokio::spawn(driver::maintain_peer(
        Side::Gateway,
        opts.gateway_url,
        tx,
        cancel.clone(),
    ));

    let relay_exited = tokio::select! {
        () = crate::shutdown_signal() => false,
        _ = &mut relay_handle => {
            tracing::warn!("relay loop exited unexpectedly");
            true
        }
    };

    cancel.cancel();
    let _ = tokio::join!(host, gateway);
    if !relay_exited {
        let relay = relay_handle.await?;
        tracing::info!(players = relay.registry().player_count(), "relay state at shutdown");
    }
    tracing::info!("mediator stopped");
    Ok(())
}
