//! Wire commands and payload schemas.
//!
//! The envelope (see [`crate::wire`]) only carries a command name and an
//! opaque payload; this module defines what that payload means for each
//! command and how it's packed into bytes. Payloads are `serde`-derived
//! structs encoded with `bincode`, the same to-bytes/from-bytes-via-serde
//! shape the teacher uses for its own message content, substituting a
//! compact binary backend since these travel on the wire rather than to
//! disk.

use serde::{Deserialize, Serialize};

/// The set of RPCs a node understands, plus the replies it sends back.
///
/// A closed enum in place of loose command strings: an unrecognized wire
/// command name decodes to [`Command::Unknown`] instead of panicking or
/// being silently mismatched against a string, so the dispatcher can log
/// and drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Pong,
    Store,
    FindNodes,
    FindValue,
    Nodes,
    Ok,
    Err,
    Data,
    Unknown,
}

impl Command {
    /// The exact ASCII name this command is sent under, fitting in
    /// [`crate::wire::COMMAND_LEN`] bytes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Pong => "pong",
            Command::Store => "store",
            Command::FindNodes => "find-nodes",
            Command::FindValue => "find-value",
            Command::Nodes => "nodes",
            Command::Ok => "ok",
            Command::Err => "err",
            Command::Data => "data",
            Command::Unknown => "unknown",
        }
    }
}

impl From<&str> for Command {
    fn from(s: &str) -> Self {
        match s {
            "ping" => Command::Ping,
            "pong" => Command::Pong,
            "store" => Command::Store,
            "find-nodes" => Command::FindNodes,
            "find-value" => Command::FindValue,
            "nodes" => Command::Nodes,
            "ok" => Command::Ok,
            "err" => Command::Err,
            "data" => Command::Data,
            _ => Command::Unknown,
        }
    }
}

/// Failure to encode or decode a payload.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("failed to encode payload: {0}")]
    Encode(bincode::Error),
    #[error("failed to decode payload: {0}")]
    Decode(bincode::Error),
}

/// Shared by `ping`, `find-nodes`'s `ok`, and every other reply that only
/// needs to echo a request id back to its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misc {
    pub request_id: u64,
}

/// `pong` — a ping reply, carrying the responder's own node id so the
/// caller can `note_alive`/promote it without a separate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub request_id: u64,
    #[serde(with = "serde_bytes")]
    pub node_id: Vec<u8>,
}

/// `find-value` request — looked up by content key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub request_id: u64,
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
}

/// `store` request, and `data`'s cache-hit reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub request_id: u64,
    #[serde(with = "serde_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub value: Vec<u8>,
}

/// One routing-table entry as carried in a `nodes` reply.
///
/// `flags` carries per-peer bits a future extension might define; this
/// implementation never sets any, so it is always zero on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRec {
    #[serde(with = "serde_bytes")]
    pub node_id: Vec<u8>,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub flags: u32,
}

/// `nodes` — the `find-nodes` reply (and the unsolicited peer-gossip
/// message of the same name), carrying up to K candidate peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nodes {
    pub request_id: u64,
    pub nodes: Vec<PeerRec>,
}

/// `err` — a request could not be satisfied; `reason` is a short
/// human-readable tag (`"bad-key-length"`, `"value-too-large"`, ...), not
/// meant for programmatic matching. Named `ErrReply` to avoid colliding
/// with `Result::Err` in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrReply {
    pub request_id: u64,
    pub reason: String,
}

macro_rules! bincode_payload {
    ($ty:ty) => {
        impl $ty {
            pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
                bincode::serialize(self).map_err(MessageError::Encode)
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
                bincode::deserialize(bytes).map_err(MessageError::Decode)
            }
        }
    };
}

bincode_payload!(Misc);
bincode_payload!(Pong);
bincode_payload!(Key);
bincode_payload!(PeerRec);
bincode_payload!(KeyValue);
bincode_payload!(Nodes);
bincode_payload!(ErrReply);
