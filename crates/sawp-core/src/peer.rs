//! Peer binding: the single remote address an endpoint talks to.
//!
//! An endpoint starts `Unbound` and latches onto the source address of the
//! first datagram it accepts. From then on, traffic from any other address
//! is rejected. The latch is never released.

use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerBinding {
    #[default]
    Unbound,
    BoundTo(SocketAddr),
}

impl PeerBinding {
    /// Latch `from` if unbound; report whether `from` is the bound peer.
    pub fn admit(&mut self, from: SocketAddr) -> bool {
        match *self {
            PeerBinding::Unbound => {
                *self = PeerBinding::BoundTo(from);
                true
            }
            PeerBinding::BoundTo(peer) => peer == from,
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        match *self {
            PeerBinding::Unbound => None,
            PeerBinding::BoundTo(peer) => Some(peer),
        }
    }
}

impl fmt::Display for PeerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerBinding::Unbound => f.write_str("unbound"),
            PeerBinding::BoundTo(peer) => write!(f, "{peer}"),
        }
    }
}
