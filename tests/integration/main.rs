//! sawp integration test harness.
//!
//! `transfer` runs both endpoints over real loopback UDP, some of it through
//! the fault-injecting relay in `fault`. `scenarios` runs them over the
//! in-memory network with a paused clock, so retransmission timeouts cost no
//! wall time and packet traces are exact.
//!
//!   cargo test --test integration
//!
//! Both endpoints of a transfer are driven from one task, so tests never need
//! to spawn and neither endpoint outlives its test.

use std::net::SocketAddr;

use anyhow::{bail, Result};
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sawp_core::config::{ReceiverConfig, SenderConfig};
use sawp_services::{run_receiver, run_sender, Datagram, ReceiverStats, SendReport};

mod transfer;

// ── Harness ───────────────────────────────────────────────────────────────────

pub fn sender_config(retransmit_timeout_ms: u64, chunk_size: usize) -> SenderConfig {
    SenderConfig {
        retransmit_timeout_ms,
        chunk_size,
    }
}

pub fn receiver_config(idle_timeout_secs: u64) -> ReceiverConfig {
    ReceiverConfig {
        idle_timeout_secs,
        ..ReceiverConfig::default()
    }
}

/// Printable ASCII, reproducible per seed.
pub fn text_input(len: usize, seed: u64) -> Bytes {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(b' '..=b'~')).collect::<Vec<u8>>().into()
}

/// Arbitrary bytes, reproducible per seed.
pub fn binary_input(len: usize, seed: u64) -> Bytes {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>().into()
}

/// Everything one transfer produced.
pub struct Transfer {
    pub report: SendReport,
    pub stats: ReceiverStats,
    pub output: Vec<u8>,
}

/// Run both endpoints to completion. The receiver must have an idle timeout,
/// otherwise this never returns.
pub async fn run_pair<S: Datagram, R: Datagram>(
    sender: &S,
    dest: SocketAddr,
    receiver: &R,
    input: Bytes,
    sender_config: &SenderConfig,
    receiver_config: &ReceiverConfig,
) -> Result<Transfer> {
    assert!(receiver_config.idle_timeout().is_some(), "receiver would never stop");
    let mut output = Vec::new();
    let (report, stats) = tokio::join!(
        run_sender(sender, dest, input, sender_config),
        run_receiver(receiver, &mut output, receiver_config),
    );
    Ok(Transfer {
        report: report?,
        stats: stats?,
        output,
    })
}

/// Run both endpoints until the sender is done, then drop the receiver.
/// Every delivered chunk is already in the output by then.
pub async fn send_until_acked<S: Datagram, R: Datagram>(
    sender: &S,
    dest: SocketAddr,
    receiver: &R,
    input: Bytes,
    sender_config: &SenderConfig,
) -> Result<(SendReport, Vec<u8>)> {
    let mut output = Vec::new();
    let idle_forever = ReceiverConfig::default();
    let report = tokio::select! {
        report = run_sender(sender, dest, input, sender_config) => report?,
        stats = run_receiver(receiver, &mut output, &idle_forever) => {
            bail!("receiver stopped before the sender finished: {stats:?}")
        }
    };
    Ok((report, output))
}
