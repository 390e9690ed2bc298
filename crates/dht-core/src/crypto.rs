//! Cryptographic primitives for the DHT wire format.
//!
//! Exactly one primitive is needed: the Bitcoin-style double-SHA-256
//! checksum that guards every envelope. It must be preserved bit-exactly
//! for interoperability, so this is a thin, literal wrapper around `sha2`
//! rather than anything clever.

use sha2::{Digest, Sha256};

/// `sha256(sha256(data))`, truncated to the leading 4 bytes the envelope
/// checksum field carries.
pub fn double_sha256_checksum(data: &[u8]) -> [u8; 4] {
    let once = Sha256::digest(data);
    let twice = Sha256::digest(once);
    let mut out = [0u8; 4];
    out.copy_from_slice(&twice[..4]);
    out
}
