//! sawp wire format: the packets exchanged between sender and receiver.
//!
//! Every datagram is one JSON object:
//!
//! ```text
//! Data:  {"type":"msg",  "seq":N, "data":"…", "checksum":"<hex>"}
//! Ack:   {"type":"ack",  "seq":N}
//! Nack:  {"type":"nack", "seq":N}
//! ```
//!
//! `checksum` is optional; a Data packet without one is accepted as intact.
//! `data` is the chunk as a JSON string when the bytes are valid UTF-8. Any
//! other chunk is hex-encoded and flagged with `"enc":"hex"`. The checksum
//! always covers the raw payload bytes, never their text form.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::digest::{digest, Digest};

/// Largest payload carried by one Data packet. Keeps a framed chunk under a
/// typical 1500-byte path MTU.
pub const MAX_CHUNK_SIZE: usize = 1375;

/// Receive buffer ceiling; larger datagrams are rejected outright.
pub const MAX_DATAGRAM: usize = 65_535;

// ── Packet ────────────────────────────────────────────────────────────────────

/// The integrity field of a Data packet, as it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// No checksum field. Treated as valid for senders that omit it.
    Absent,
    Present(Digest),
    /// A checksum field that is not a well-formed digest. Never valid.
    Garbled(String),
}

impl Checksum {
    /// Does this checksum vouch for `payload`?
    pub fn verifies(&self, payload: &[u8]) -> bool {
        match self {
            Checksum::Absent => true,
            Checksum::Present(claimed) => crate::digest::verify(payload, claimed),
            Checksum::Garbled(_) => false,
        }
    }

    fn from_wire(field: Option<String>) -> Self {
        match field {
            None => Checksum::Absent,
            Some(text) => match text.parse() {
                Ok(d) => Checksum::Present(d),
                Err(_) => Checksum::Garbled(text),
            },
        }
    }

    fn to_wire(&self) -> Option<String> {
        match self {
            Checksum::Absent => None,
            Checksum::Present(d) => Some(d.to_string()),
            Checksum::Garbled(text) => Some(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data {
        seq: u64,
        payload: Bytes,
        checksum: Checksum,
    },
    Ack {
        seq: u64,
    },
    Nack {
        seq: u64,
    },
}

impl Packet {
    /// Build a Data packet, computing the digest over `payload` now.
    pub fn data(seq: u64, payload: Bytes) -> Self {
        let checksum = Checksum::Present(digest(&payload));
        Packet::Data {
            seq,
            payload,
            checksum,
        }
    }

    pub fn ack(seq: u64) -> Self {
        Packet::Ack { seq }
    }

    pub fn nack(seq: u64) -> Self {
        Packet::Nack { seq }
    }

    pub fn seq(&self) -> u64 {
        match self {
            Packet::Data { seq, .. } | Packet::Ack { seq } | Packet::Nack { seq } => *seq,
        }
    }

    /// Integrity check. Only Data packets carry anything to verify.
    pub fn is_intact(&self) -> bool {
        match self {
            Packet::Data {
                payload, checksum, ..
            } => checksum.verifies(payload),
            _ => true,
        }
    }

    /// Serialize to a single datagram.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let frame = match self {
            Packet::Data {
                seq,
                payload,
                checksum,
            } => {
                if payload.len() > MAX_CHUNK_SIZE {
                    return Err(WireError::PayloadTooLarge(payload.len()));
                }
                let (data, enc) = match std::str::from_utf8(payload) {
                    Ok(text) => (text.to_owned(), Encoding::Text),
                    Err(_) => (hex::encode(payload), Encoding::Hex),
                };
                Frame::Msg {
                    seq: *seq,
                    data,
                    checksum: checksum.to_wire(),
                    enc,
                }
            }
            Packet::Ack { seq } => Frame::Ack { seq: *seq },
            Packet::Nack { seq } => Frame::Nack { seq: *seq },
        };
        let bytes = serde_json::to_vec(&frame)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(WireError::Oversize(bytes.len()));
        }
        Ok(bytes)
    }

    /// Parse one datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() > MAX_DATAGRAM {
            return Err(WireError::Oversize(buf.len()));
        }
        let packet = match serde_json::from_slice::<Frame>(buf)? {
            Frame::Msg {
                seq,
                data,
                checksum,
                enc,
            } => {
                let payload = match enc {
                    Encoding::Text => Bytes::from(data.into_bytes()),
                    Encoding::Hex => Bytes::from(hex::decode(&data)?),
                };
                if payload.len() > MAX_CHUNK_SIZE {
                    return Err(WireError::PayloadTooLarge(payload.len()));
                }
                Packet::Data {
                    seq,
                    payload,
                    checksum: Checksum::from_wire(checksum),
                }
            }
            Frame::Ack { seq } => Packet::Ack { seq },
            Frame::Nack { seq } => Packet::Nack { seq },
        };
        Ok(packet)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Data { seq, .. } => write!(f, "Data({seq})"),
            Packet::Ack { seq } => write!(f, "Ack({seq})"),
            Packet::Nack { seq } => write!(f, "Nack({seq})"),
        }
    }
}

// ── JSON frames ───────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Frame {
    Msg {
        seq: u64,
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<String>,
        #[serde(default, skip_serializing_if = "Encoding::is_text")]
        enc: Encoding,
    },
    Ack {
        seq: u64,
    },
    Nack {
        seq: u64,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    #[default]
    Text,
    Hex,
}

impl Encoding {
    fn is_text(&self) -> bool {
        *self == Encoding::Text
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("datagram of {0} bytes exceeds the {MAX_DATAGRAM}-byte limit")]
    Oversize(usize),
    #[error("malformed packet: {0}")]
    Json(#[from] serde_json::Error),
    #[error("hex payload is invalid: {0}")]
    BadPayload(#[from] hex::FromHexError),
    #[error("payload of {0} bytes exceeds the {MAX_CHUNK_SIZE}-byte chunk limit")]
    PayloadTooLarge(usize),
}
