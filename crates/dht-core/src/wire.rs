//! The DHT envelope — the framed on-the-wire container every message
//! travels in.
//!
//! Every datagram sent or received by a node starts with this 24-byte
//! header, in the same spirit as the teacher's own fixed-size wire headers:
//! the receiver can validate framing, length, and integrity before looking
//! at a single payload byte.
//!
//! Layout (little-endian):
//!
//! ```text
//! offset  size  field
//! 0       4     magic       = "DHT1"
//! 4       12    command     = ASCII, NUL-padded on the right
//! 16      4     payload_len (u32)
//! 20      4     checksum    = first 4 bytes of sha256(sha256(payload))
//! 24      L     payload bytes
//! ```

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::crypto::double_sha256_checksum;

/// Magic bytes identifying a DHT envelope.
pub const MAGIC: [u8; 4] = *b"DHT1";

/// Width of the `command` field, in bytes. Command names longer than this
/// are a programmer error (spec §7) — `encode` asserts on it rather than
/// truncating silently.
pub const COMMAND_LEN: usize = 12;

/// Size of the fixed envelope header, in bytes.
pub const HEADER_LEN: usize = 24;

/// Payloads larger than this are rejected during decode.
pub const MAX_PAYLOAD: u32 = 16 * 1024 * 1024;

/// The fixed 24-byte envelope header, laid out exactly as the wire format
/// requires. `#[repr(C, packed)]` plus `zerocopy` gives a safe,
/// allocation-free view over a received datagram buffer — the same
/// technique the teacher uses for its own chunk header.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct EnvelopeHeader {
    magic: [u8; 4],
    command: [u8; COMMAND_LEN],
    payload_len: u32,
    checksum: [u8; 4],
}

assert_eq_size!(EnvelopeHeader, [u8; HEADER_LEN]);

/// Why a received datagram could not be turned into `(command, payload)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram shorter than the {HEADER_LEN}-byte envelope header")]
    ShortFrame,
    #[error("bad magic bytes")]
    BadMagic,
    #[error("payload_len {0} exceeds the {MAX_PAYLOAD} byte maximum")]
    Oversize(u32),
    #[error("datagram truncated: header declares {declared} payload bytes, got {actual}")]
    Truncated { declared: u32, actual: usize },
    #[error("checksum mismatch")]
    BadChecksum,
}

/// A command name longer than [`COMMAND_LEN`] bytes was passed to `encode`.
/// Spec §7 classifies this as a programmer error, not a recoverable one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command {0:?} exceeds {COMMAND_LEN} bytes")]
pub struct CommandTooLong(pub String);

/// Encode `command` and `payload` into a framed envelope.
///
/// Returns [`CommandTooLong`] if `command` does not fit in
/// [`COMMAND_LEN`] bytes — every command name used by this crate is a
/// short, fixed ASCII literal, so callers should treat this as unreachable
/// rather than handle it at runtime.
pub fn encode(command: &str, payload: &[u8]) -> Result<Vec<u8>, CommandTooLong> {
    if command.len() > COMMAND_LEN {
        return Err(CommandTooLong(command.to_string()));
    }

    let mut command_bytes = [0u8; COMMAND_LEN];
    command_bytes[..command.len()].copy_from_slice(command.as_bytes());

    let header = EnvelopeHeader {
        magic: MAGIC,
        command: command_bytes,
        payload_len: payload.len() as u32,
        checksum: double_sha256_checksum(payload),
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decode a received datagram into `(command, payload)`.
///
/// Every failure mode here is a framing/integrity problem — per spec §7
/// the caller's only correct response is to drop the datagram (and
/// optionally log it), never to propagate the error further.
pub fn decode(buf: &[u8]) -> Result<(String, &[u8]), DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::ShortFrame);
    }

    let header = EnvelopeHeader::read_from_prefix(buf).expect("length already checked above");
    // Copy packed fields to locals before use — references to fields of a
    // `#[repr(packed)]` struct are unaligned and not allowed.
    let magic = header.magic;
    let command_field = header.command;
    let payload_len = header.payload_len;
    let checksum = header.checksum;

    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    if payload_len > MAX_PAYLOAD {
        return Err(DecodeError::Oversize(payload_len));
    }

    let declared_end = HEADER_LEN + payload_len as usize;
    if buf.len() < declared_end {
        return Err(DecodeError::Truncated {
            declared: payload_len,
            actual: buf.len() - HEADER_LEN,
        });
    }

    let payload = &buf[HEADER_LEN..declared_end];
    let expected = double_sha256_checksum(payload);
    if expected != checksum {
        return Err(DecodeError::BadChecksum);
    }

    let command_end = command_field.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    let command = String::from_utf8_lossy(&command_field[..command_end]).into_owned();

    Ok((command, payload))
}
