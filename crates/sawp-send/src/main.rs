//! sawp-send: transmit stdin to a sawp receiver.
//!
//! Reads standard input to the end, then sends it chunk by chunk and exits
//! once the receiver has acknowledged every chunk. Diagnostics go to stderr.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use sawp_core::config::SawpConfig;
use sawp_services::{bind_ephemeral, run_sender};

/// Reliable stop-and-wait sender over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Receiver host name or address.
    host: String,
    /// Receiver UDP port.
    port: u16,
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

    let config = SawpConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SawpConfig::default()
    });
    config.validate().context("invalid configuration")?;

    let dest = tokio::net::lookup_host((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to resolve {}", cli.host))?
        .next()
        .with_context(|| format!("no address for {}", cli.host))?;

    let socket = bind_ephemeral(dest)
        .await
        .context("failed to bind sender socket")?;
    tracing::info!(port = socket.local_addr()?.port(), %dest, "bound to port");

    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("failed to read stdin")?;

    let report = run_sender(&socket, dest, Bytes::from(input), &config.sender).await?;
    report.log();
    Ok(())
}
