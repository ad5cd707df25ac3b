//! Receiver: deliver chunks in order, exactly once.
//!
//! Every intact Data packet from the latched peer is acknowledged, whether or
//! not it is new; a lost Ack must be recoverable by the sender's retransmission.
//! A payload is delivered only when its sequence number is above the highest
//! one delivered so far. Corrupted packets are answered with a Nack and never
//! delivered.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use sawp_core::config::ReceiverConfig;
use sawp_core::wire::{Packet, MAX_DATAGRAM};
use sawp_core::PeerBinding;

use crate::stats::ReceiverStats;
use crate::transport::{Datagram, MAX_RECV_FAILURES};

/// What the receiver made of one decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reception {
    /// Sent by someone other than the latched peer. No reply.
    Foreign { from: SocketAddr },
    /// Ack/Nack addressed to the receiver. No reply.
    Ignored,
    /// Failed the integrity check. Reply Nack.
    Corrupt { seq: u64 },
    /// New in-order data; write `payload` out, then reply Ack.
    Delivered { seq: u64, payload: Bytes },
    /// Already delivered. Reply Ack, deliver nothing.
    Duplicate { seq: u64 },
}

impl Reception {
    /// The packet to send back to the peer, if any.
    pub fn reply(&self) -> Option<Packet> {
        match self {
            Reception::Foreign { .. } | Reception::Ignored => None,
            Reception::Corrupt { seq } => Some(Packet::nack(*seq)),
            Reception::Delivered { seq, .. } | Reception::Duplicate { seq } => {
                Some(Packet::ack(*seq))
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ReceiverSession {
    peer: PeerBinding,
    /// Sequence number of the last delivered chunk. `None` until the first.
    highest_delivered: Option<u64>,
    stats: ReceiverStats,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> PeerBinding {
        self.peer
    }

    pub fn highest_delivered(&self) -> Option<u64> {
        self.highest_delivered
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn into_stats(self) -> ReceiverStats {
        self.stats
    }

    /// Count a datagram that did not decode. It does not latch the peer.
    pub fn note_malformed(&mut self) {
        self.stats.malformed += 1;
    }

    pub fn handle(&mut self, packet: Packet, from: SocketAddr) -> Reception {
        if !self.peer.admit(from) {
            self.stats.foreign += 1;
            return Reception::Foreign { from };
        }
        self.stats.peer = self.peer.peer();

        let Packet::Data {
            seq,
            payload,
            checksum,
        } = packet
        else {
            self.stats.ignored += 1;
            return Reception::Ignored;
        };

        if !checksum.verifies(&payload) {
            self.stats.corrupt += 1;
            return Reception::Corrupt { seq };
        }

        if self.highest_delivered.is_some_and(|high| seq <= high) {
            self.stats.duplicates += 1;
            return Reception::Duplicate { seq };
        }

        self.highest_delivered = Some(seq);
        self.stats.delivered_chunks += 1;
        self.stats.delivered_bytes += payload.len() as u64;
        Reception::Delivered { seq, payload }
    }
}

/// Receive a stream on `transport` and write it to `sink`.
///
/// Runs until the transport fails `MAX_RECV_FAILURES` receives in a row, the
/// sink fails, or, when `idle_timeout_secs` is set, no datagram arrives for
/// that long. Without an idle timeout the loop only ends on error.
pub async fn run_receiver<T, W>(
    transport: &T,
    sink: &mut W,
    config: &ReceiverConfig,
) -> Result<ReceiverStats>
where
    T: Datagram,
    W: AsyncWrite + Unpin,
{
    let mut session = ReceiverSession::new();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let idle = config.idle_timeout();
    let mut recv_failures = 0u32;

    loop {
        let received = match idle {
            Some(limit) => match tokio::time::timeout(limit, transport.recv_from(&mut buf)).await {
                Ok(r) => r,
                Err(_) => {
                    tracing::info!(
                        idle_secs = limit.as_secs(),
                        delivered = session.stats().delivered_chunks,
                        "idle timeout, stopping"
                    );
                    break;
                }
            },
            None => transport.recv_from(&mut buf).await,
        };

        let (len, from) = match received {
            Ok(r) => {
                recv_failures = 0;
                r
            }
            Err(e) => {
                recv_failures += 1;
                tracing::warn!(error = %e, failures = recv_failures, "recv_from failed");
                if recv_failures >= MAX_RECV_FAILURES {
                    return Err(e).with_context(|| {
                        format!("recv_from failed {recv_failures} times in a row")
                    });
                }
                tokio::task::yield_now().await;
                continue;
            }
        };

        let packet = match Packet::decode(&buf[..len]) {
            Ok(p) => p,
            Err(e) => {
                session.note_malformed();
                tracing::debug!(%from, len, error = %e, "undecodable datagram, discarding");
                continue;
            }
        };

        let reception = session.handle(packet, from);
        match &reception {
            Reception::Foreign { from } => {
                tracing::info!(
                    %from,
                    peer = %session.peer(),
                    "received data from unexpected remote, ignoring"
                );
            }
            Reception::Ignored => {
                tracing::debug!(%from, "control packet sent to receiver, ignoring");
            }
            Reception::Corrupt { seq } => {
                tracing::info!(seq, "checksum failed, sending nack");
            }
            Reception::Delivered { seq, payload } => {
                sink.write_all(payload)
                    .await
                    .context("failed to write delivered data")?;
                sink.flush().await.context("failed to flush output")?;
                tracing::debug!(seq, len = payload.len(), "delivered chunk");
            }
            Reception::Duplicate { seq } => {
                tracing::debug!(seq, "duplicate chunk, re-acknowledging");
            }
        }

        if let Some(reply) = reception.reply() {
            let frame = reply.encode().context("failed to encode reply")?;
            if let Err(e) = transport.send_to(&frame, from).await {
                tracing::warn!(%reply, error = %e, "send_to failed");
            }
        }
    }

    let stats = session.into_stats();
    stats.log();
    Ok(stats)
}
