// PeerBeam relay: rendezvous daemon plus direct-channel send/receive.

mod config;
mod direct;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use beam_core::{Relay, RoomRegistry};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "beam-relay", version, about = "PeerBeam rendezvous relay and transfer tools")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to ~/.config/peerbeam/config.toml, then /etc/peerbeam/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the rendezvous relay (default).
    Serve {
        /// Listen address, overriding the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Send a file to a receiver over a direct TCP channel.
    Send { addr: SocketAddr, file: PathBuf },
    /// Wait for one sender and save the received file.
    Receive {
        listen: SocketAddr,
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = config::load(cli.config.as_deref());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match cli.command.unwrap_or(Command::Serve { listen: None }) {
            Command::Serve { listen } => serve(listen.unwrap_or(cfg.listen_addr), &cfg).await,
            Command::Send { addr, file } => {
                let progress = direct::send_file(addr, &file, &cfg).await?;
                println!("sent {} bytes", progress.bytes_moved);
                Ok(())
            }
            Command::Receive { listen, dir } => {
                let path = direct::receive_file(listen, &dir).await?;
                println!("saved {}", path.display());
                Ok(())
            }
        }
    })
}

async fn serve(addr: SocketAddr, cfg: &config::Config) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let relay = Arc::new(Relay::new(RoomRegistry::with_max_rooms(cfg.max_rooms)));
    info!(event = "relay_config", max_rooms = relay.registry().max_rooms(), "Room capacity set");
    tokio::select! {
        res = server::run_server(listener, relay) => res?,
        res = shutdown_signal() => {
            res?;
            info!(event = "relay_shutdown", "Shutting down");
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
