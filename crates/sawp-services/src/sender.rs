//! Sender: stop-and-wait chunk transmission.
//!
//! [`SenderSession`] is the state machine. It never touches a socket; it
//! hands out encoded frames and digests replies. [`run_sender`] owns the loop:
//! send the frame, wait for a reply or the retransmission timeout, repeat.
//!
//! # Stop-and-wait contract
//! - At most one Data packet is in flight (`SenderState::AwaitingAck`).
//! - A new chunk is cut only from `Idle`, i.e. after the previous one was acked.
//! - Retransmissions resend the exact bytes of the in-flight frame.
//! - Retries are unbounded and the timeout is constant.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::time::Instant;

use sawp_core::chunk::split_chunk;
use sawp_core::config::SenderConfig;
use sawp_core::wire::{Packet, WireError, MAX_CHUNK_SIZE, MAX_DATAGRAM};
use sawp_core::PeerBinding;

use crate::stats::SendReport;
use crate::transport::{Datagram, MAX_RECV_FAILURES};

// ── State machine ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    /// Ready to cut the next chunk.
    Idle,
    /// One Data packet is on the wire and unacknowledged.
    AwaitingAck {
        seq: u64,
        /// Exact bytes last transmitted, resent verbatim.
        frame: Bytes,
        payload_len: usize,
        transmissions: u32,
    },
    /// Every chunk has been acknowledged.
    Done,
}

/// What a reply meant to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The outstanding chunk is acknowledged; the session moved on.
    Acked {
        seq: u64,
        bytes: usize,
        transmissions: u32,
    },
    /// The receiver saw a corrupted copy; retransmit.
    Nacked { seq: u64 },
    /// Ack/Nack for a sequence number that is not outstanding.
    Stale { seq: u64 },
    /// Not from the latched peer.
    Foreign,
    /// A Data packet sent to the sender.
    Unexpected,
}

#[derive(Debug)]
pub struct SenderSession {
    state: SenderState,
    /// Sequence number of the outstanding chunk, or of the next one when idle.
    current_seq: u64,
    remaining: Bytes,
    chunk_size: usize,
    peer: PeerBinding,
}

impl SenderSession {
    /// `chunk_size` is clamped to `1..=MAX_CHUNK_SIZE`.
    pub fn new(input: Bytes, chunk_size: usize) -> Self {
        let state = if input.is_empty() {
            SenderState::Done
        } else {
            SenderState::Idle
        };
        Self {
            state,
            current_seq: 0,
            remaining: input,
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            peer: PeerBinding::Unbound,
        }
    }

    pub fn state(&self) -> &SenderState {
        &self.state
    }

    pub fn current_seq(&self) -> u64 {
        self.current_seq
    }

    pub fn is_done(&self) -> bool {
        self.state == SenderState::Done
    }

    /// Bytes not yet cut into chunks.
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    pub fn peer(&self) -> PeerBinding {
        self.peer
    }

    /// Cut the next chunk and return its encoded Data frame.
    ///
    /// Returns `None` while a frame is in flight and once the input is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, WireError> {
        if self.state != SenderState::Idle {
            return Ok(None);
        }
        let Some(chunk) = split_chunk(&mut self.remaining, self.chunk_size) else {
            self.state = SenderState::Done;
            return Ok(None);
        };
        let payload_len = chunk.len();
        let frame = Bytes::from(Packet::data(self.current_seq, chunk).encode()?);
        self.state = SenderState::AwaitingAck {
            seq: self.current_seq,
            frame: frame.clone(),
            payload_len,
            transmissions: 1,
        };
        Ok(Some(frame))
    }

    /// The in-flight frame again, unchanged. `None` if nothing is in flight.
    pub fn retransmit(&mut self) -> Option<Bytes> {
        match &mut self.state {
            SenderState::AwaitingAck {
                frame,
                transmissions,
                ..
            } => {
                *transmissions += 1;
                Some(frame.clone())
            }
            _ => None,
        }
    }

    /// Feed a decoded reply received from `from`.
    pub fn on_reply(&mut self, packet: &Packet, from: SocketAddr) -> ReplyOutcome {
        if !self.peer.admit(from) {
            return ReplyOutcome::Foreign;
        }
        let (outstanding, bytes, transmissions) = match &self.state {
            SenderState::AwaitingAck {
                seq,
                payload_len,
                transmissions,
                ..
            } => (Some(*seq), *payload_len, *transmissions),
            _ => (None, 0, 0),
        };

        match *packet {
            Packet::Ack { seq } if Some(seq) == outstanding => {
                self.current_seq += 1;
                self.state = if self.remaining.is_empty() {
                    SenderState::Done
                } else {
                    SenderState::Idle
                };
                ReplyOutcome::Acked {
                    seq,
                    bytes,
                    transmissions,
                }
            }
            Packet::Nack { seq } if Some(seq) == outstanding => ReplyOutcome::Nacked { seq },
            Packet::Ack { seq } | Packet::Nack { seq } => ReplyOutcome::Stale { seq },
            Packet::Data { .. } => ReplyOutcome::Unexpected,
        }
    }
}

// ── Send loop ─────────────────────────────────────────────────────────────────

/// Transmit `input` to `dest` and return once every chunk is acknowledged.
///
/// Exactly one receive is outstanding at a time, bounded by a deadline that
/// restarts on every (re)transmission. There is no retry ceiling: against a
/// peer that never answers, this never returns. It fails only when the
/// transport itself fails `MAX_RECV_FAILURES` receives in a row.
pub async fn run_sender<T: Datagram>(
    transport: &T,
    dest: SocketAddr,
    input: Bytes,
    config: &SenderConfig,
) -> Result<SendReport> {
    let started = Instant::now();
    let rto = config.retransmit_timeout();
    let mut session = SenderSession::new(input, config.chunk_size);
    let mut report = SendReport::default();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut recv_failures = 0u32;

    tracing::info!(
        %dest,
        bytes = session.remaining(),
        chunk_size = config.chunk_size,
        rto_ms = rto.as_millis() as u64,
        "sender starting"
    );

    while let Some(frame) = session.next_frame().context("failed to encode chunk")? {
        let seq = session.current_seq();
        transmit(transport, &frame, dest, seq, &mut report).await;
        let mut deadline = Instant::now() + rto;

        loop {
            let received =
                tokio::time::timeout_at(deadline, transport.recv_from(&mut buf)).await;
            let (len, from) = match received {
                Err(_) => {
                    report.timeouts += 1;
                    tracing::info!(seq, "timeout waiting for ack, resending");
                    if let Some(frame) = session.retransmit() {
                        transmit(transport, &frame, dest, seq, &mut report).await;
                    }
                    deadline = Instant::now() + rto;
                    continue;
                }
                Ok(Err(e)) => {
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
                Ok(Ok(r)) => {
                    recv_failures = 0;
                    r
                }
            };

            let packet = match Packet::decode(&buf[..len]) {
                Ok(p) => p,
                Err(e) => {
                    report.malformed += 1;
                    tracing::debug!(%from, error = %e, "undecodable datagram, discarding");
                    continue;
                }
            };

            match session.on_reply(&packet, from) {
                ReplyOutcome::Acked {
                    seq,
                    bytes,
                    transmissions,
                } => {
                    report.chunks += 1;
                    report.bytes += bytes as u64;
                    tracing::debug!(seq, transmissions, "ack received");
                    break;
                }
                ReplyOutcome::Nacked { seq } => {
                    report.nacks += 1;
                    tracing::info!(seq, "nack received (checksum failed), resending");
                    if let Some(frame) = session.retransmit() {
                        transmit(transport, &frame, dest, seq, &mut report).await;
                    }
                    deadline = Instant::now() + rto;
                }
                ReplyOutcome::Stale { seq: stale } => {
                    report.stale += 1;
                    tracing::debug!(seq = stale, outstanding = seq, "stale reply, ignoring");
                }
                ReplyOutcome::Foreign => {
                    report.foreign += 1;
                    tracing::info!(
                        %from,
                        peer = %session.peer(),
                        "received response from unexpected remote, ignoring"
                    );
                }
                ReplyOutcome::Unexpected => {
                    report.malformed += 1;
                    tracing::debug!(%from, %packet, "data packet sent to sender, ignoring");
                }
            }
        }
    }

    report.elapsed = started.elapsed();
    Ok(report)
}

async fn transmit<T: Datagram>(
    transport: &T,
    frame: &[u8],
    dest: SocketAddr,
    seq: u64,
    report: &mut SendReport,
) {
    report.transmissions += 1;
    tracing::debug!(seq, len = frame.len(), %dest, "sending data packet");
    // A failed send is indistinguishable from loss; the timeout recovers it.
    if let Err(e) = transport.send_to(frame, dest).await {
        tracing::warn!(seq, error = %e, "send_to failed");
    }
}
