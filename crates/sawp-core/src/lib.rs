//! sawp-core: wire format, integrity codec, and session primitives.
//! The other sawp crates depend on this one.

pub mod chunk;
pub mod config;
pub mod digest;
pub mod peer;
pub mod wire;

pub use digest::{digest, verify, Digest};
pub use peer::PeerBinding;
pub use wire::{Checksum, Packet, MAX_CHUNK_SIZE, MAX_DATAGRAM};
