//! sawp-recv: receive a sawp stream and write it to stdout.
//!
//! Binds a UDP port, announces it on stderr, and writes each new in-order
//! chunk to stdout as it arrives. Runs until killed, or until the configured
//! idle timeout passes with no traffic.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use sawp_core::config::SawpConfig;
use sawp_services::run_receiver;

/// Reliable stop-and-wait receiver over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to bind, overriding `receiver.bind_addr`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = SawpConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SawpConfig::default()
    });
    if let Some(bind) = cli.bind {
        config.receiver.bind_addr = bind;
    }
    config.validate().context("invalid configuration")?;

    let bind_addr = config.receiver.bind_addr()?;
    let socket = UdpSocket::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(port = socket.local_addr()?.port(), "bound to port");

    let mut stdout = tokio::io::stdout();
    run_receiver(&socket, &mut stdout, &config.receiver).await?;
    Ok(())
}
