//! quizrelay: mediator and audience gateway in one binary.

use clap::Parser;

mod cli;
mod gateway_server;
mod inbox;
mod mediator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("QUIZRELAY_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match args.command {
        cli::Command::Mediator(opts) => {
            tracing::info!("quizrelay mediator starting");
            mediator::run_mediator(opts).await?;
        }
        cli::Command::Gateway(opts) => {
            tracing::info!("quizrelay gateway starting");
            gateway_server::run_gateway(opts).await?;
        }
    }

    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
