//! Transfer statistics: what each endpoint saw over its lifetime.

use std::net::SocketAddr;
use std::time::Duration;

/// Outcome of a completed send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Chunks acknowledged (== chunks sent).
    pub chunks: u64,
    /// Payload bytes acknowledged.
    pub bytes: u64,
    /// Data packets put on the wire, including retransmissions.
    pub transmissions: u64,
    pub timeouts: u64,
    pub nacks: u64,
    /// Ack/Nack replies for a sequence number no longer outstanding.
    pub stale: u64,
    /// Datagrams from an address other than the latched peer.
    pub foreign: u64,
    pub malformed: u64,
    pub elapsed: Duration,
}

impl SendReport {
    pub fn retransmissions(&self) -> u64 {
        self.transmissions.saturating_sub(self.chunks)
    }

    pub fn log(&self) {
        tracing::info!(
            chunks = self.chunks,
            bytes = self.bytes,
            transmissions = self.transmissions,
            retransmissions = self.retransmissions(),
            timeouts = self.timeouts,
            nacks = self.nacks,
            stale = self.stale,
            foreign = self.foreign,
            malformed = self.malformed,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "transfer complete"
        );
    }
}

/// Counters kept by a receiver session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub peer: Option<SocketAddr>,
    pub delivered_chunks: u64,
    pub delivered_bytes: u64,
    /// Data packets at or below the delivery high-water mark, re-acknowledged.
    pub duplicates: u64,
    /// Data packets that failed the integrity check, answered with Nack.
    pub corrupt: u64,
    pub foreign: u64,
    /// Ack/Nack packets sent to the receiver; they carry nothing for it.
    pub ignored: u64,
    pub malformed: u64,
}

impl ReceiverStats {
    pub fn log(&self) {
        tracing::info!(
            peer = ?self.peer,
            delivered_chunks = self.delivered_chunks,
            delivered_bytes = self.delivered_bytes,
            duplicates = self.duplicates,
            corrupt = self.corrupt,
            foreign = self.foreign,
            ignored = self.ignored,
            malformed = self.malformed,
            "receiver stats"
        );
    }
}
