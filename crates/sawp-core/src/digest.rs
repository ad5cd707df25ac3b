//! Integrity codec: detects accidental corruption of chunk payloads.
//!
//! A digest is the BLAKE3 hash of the payload bytes. It is not a MAC: there is
//! no key, and nothing here defends against a peer that forges both payload
//! and digest. It only has to catch bit flips and truncation in transit.
//!
//! Text form is lowercase hex. The empty payload maps to [`Digest::EMPTY`],
//! which is written as the single character `"0"` on the wire.

use std::fmt;
use std::str::FromStr;

/// Length of a digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Fixed-length integrity value computed over a payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Canonical digest of the empty payload.
    pub const EMPTY: Digest = Digest([0u8; DIGEST_LEN]);

    pub fn is_empty_sentinel(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Compute the digest of `payload`.
pub fn digest(payload: &[u8]) -> Digest {
    if payload.is_empty() {
        return Digest::EMPTY;
    }
    Digest(*blake3::hash(payload).as_bytes())
}

/// Recompute the digest of `payload` and compare it against `claimed`.
pub fn verify(payload: &[u8], claimed: &Digest) -> bool {
    digest(payload) == *claimed
}

// ── Text form ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DigestError {
    #[error("digest is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
    #[error("digest has {0} bytes, expected {DIGEST_LEN}")]
    WrongLength(usize),
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty_sentinel() {
            f.write_str("0")
        } else {
            f.write_str(&hex::encode(self.0))
        }
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(Self::EMPTY);
        }
        let raw = hex::decode(s)?;
        let bytes: [u8; DIGEST_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| DigestError::WrongLength(raw.len()))?;
        Ok(Self(bytes))
    }
}
