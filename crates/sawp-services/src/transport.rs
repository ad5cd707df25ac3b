//! Datagram transport: the only I/O the protocol endpoints perform.
//!
//! Both loops consume exactly two operations: send a datagram to an address
//! and receive a datagram with its source address. Production code runs on
//! `tokio::net::UdpSocket`; tests run on [`crate::sim::SimSocket`].

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;

/// Consecutive failed receives after which an endpoint loop gives up on its
/// transport. A single failure (e.g. a stray ICMP error) is retried.
pub const MAX_RECV_FAILURES: u32 = 8;

#[allow(async_fn_in_trait)]
pub trait Datagram {
    /// Send `buf` as one datagram to `dest`.
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize>;

    /// Wait for the next datagram. Cancel-safe: dropping the future loses nothing.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Datagram for UdpSocket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Bind a UDP socket on an OS-assigned port, in the same address family as `peer`.
pub async fn bind_ephemeral(peer: SocketAddr) -> io::Result<UdpSocket> {
    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    UdpSocket::bind(local).await
}
