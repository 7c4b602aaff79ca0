//! CLI definition using clap derive.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "quizrelay", about = "Live quiz relay between host, mediator and audience")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the mediator (connects to the host and the gateway)
    Mediator(MediatorOpts),
    /// Run the audience gateway (accepts the mediator, reads the inbox)
    Gateway(GatewayOpts),
}

#[derive(clap::Args)]
pub struct MediatorOpts {
    /// Host WebSocket URL
    #[arg(long, env = "QUIZRELAY_HOST_URL")]
    pub host_url: String,

    /// Gateway WebSocket URL
    #[arg(long, env = "QUIZRELAY_GATEWAY_URL")]
    pub gateway_url: String,
}

#[derive(clap::Args)]
pub struct GatewayOpts {
    /// Address the mediator connects to
    #[arg(long, env = "QUIZRELAY_LISTEN", default_value = "127.0.0.1:7400")]
    pub listen: SocketAddr,

    /// Address the carrier adapter delivers audience messages to
    #[arg(long, env = "QUIZRELAY_INBOX", default_value = "127.0.0.1:7401")]
    pub inbox: SocketAddr,

    /// Key prefix for persisted player records
    #[arg(long, env = "QUIZRELAY_NAMESPACE", default_value = "quiz")]
    pub namespace: String,

    /// Carrier account audience messages must be addressed to
    #[arg(long, env = "QUIZRELAY_CARRIER_ACCOUNT")]
    pub carrier_account: String,

    /// Sender number for audience replies
    #[arg(long, env = "QUIZRELAY_CARRIER_PHONE")]
    pub carrier_phone: String,
}
