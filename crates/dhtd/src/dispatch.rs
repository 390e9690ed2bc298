//! Maps a decoded command + payload to a handler, and builds the reply.
//!
//! Mirrors the split the teacher's own `ServiceDispatcher` draws: this
//! function takes already-decoded bytes and the pieces of state a handler
//! might touch, and returns the bytes of a reply (if any) — no socket I/O
//! happens here, so it's unit-testable without a network.

use std::net::SocketAddr;

use dht_core::message::{Key, KeyValue, Misc, Nodes, Pong};
use dht_core::node_id::NodeId;
use dht_core::Command;
use dht_services::{PeerRecord, RoutingTable, ValueCache};

/// Content keys accepted by the cache: one width per common digest
/// (SHA-1, SHA-256, SHA-512).
fn key_len_valid(len: usize) -> bool {
    matches!(len, 20 | 32 | 64)
}

const MAX_VALUE_LEN: usize = 4096;

/// Everything a handler might read or mutate.
pub struct NodeState {
    pub local_id: NodeId,
    pub routing: RoutingTable,
    pub cache: ValueCache,
    pub k: usize,
}

impl NodeState {
    pub fn new(local_id: NodeId, k: usize, cache_capacity: usize) -> Self {
        Self {
            local_id,
            routing: RoutingTable::new(local_id, k),
            cache: ValueCache::new(cache_capacity),
            k,
        }
    }
}

fn peer_rec(peer: &PeerRecord) -> dht_core::message::PeerRec {
    dht_core::message::PeerRec {
        node_id: peer.node_id.as_bytes().to_vec(),
        ip: peer.addr.to_string(),
        port: peer.port,
        flags: peer.flags,
    }
}

fn nodes_reply(state: &NodeState, request_id: u64, key: &[u8]) -> (String, Vec<u8>) {
    let lookup_id = NodeId::from_key_bytes(key);
    let closest = state.routing.find_nodes(&lookup_id, state.k);
    let nodes = Nodes {
        request_id,
        nodes: closest.iter().map(peer_rec).collect(),
    };
    (Command::Nodes.as_str().to_string(), nodes.to_bytes().expect("Nodes payload always encodes"))
}

fn err_reply(request_id: u64) -> (String, Vec<u8>) {
    (Command::Err.as_str().to_string(), Misc { request_id }.to_bytes().expect("Misc payload always encodes"))
}

fn ok_reply(request_id: u64) -> (String, Vec<u8>) {
    (Command::Ok.as_str().to_string(), Misc { request_id }.to_bytes().expect("Misc payload always encodes"))
}

/// Decode one datagram's payload and run the matching handler, returning
/// the `(command, payload)` of a reply to send back to `sender`, if any.
///
/// Frame and schema errors never reach here (the node drops those before
/// calling `dispatch`); this only sees well-formed `(command, payload)`
/// pairs.
pub fn dispatch(
    state: &mut NodeState,
    command: Command,
    payload: &[u8],
    sender: SocketAddr,
) -> Option<(String, Vec<u8>)> {
    match command {
        Command::Ping => {
            let misc = match Misc::from_bytes(payload) {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse ping payload");
                    return None;
                }
            };
            let pong = Pong {
                request_id: misc.request_id,
                node_id: state.local_id.as_bytes().to_vec(),
            };
            Some((
                Command::Pong.as_str().to_string(),
                pong.to_bytes().expect("Pong payload always encodes"),
            ))
        }

        Command::Pong => {
            let pong = match Pong::from_bytes(payload) {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse pong payload");
                    return None;
                }
            };
            if let Some(node_id) = NodeId::from_bytes(&pong.node_id) {
                // `add_node` is a no-op for a peer already known (by id or
                // address), so this also handles first contact with a
                // bootstrap peer that wasn't in the table before its pong
                // arrived — `note_alive` alone can't promote a peer the
                // table has never heard of.
                state.routing.add_node(node_id, sender.ip(), sender.port(), 0);
                state.routing.note_alive(&node_id);
            } else {
                tracing::debug!(%sender, "pong carried a malformed node id");
            }
            None
        }

        Command::Store => {
            let kv = match KeyValue::from_bytes(payload) {
                Ok(kv) => kv,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse store payload");
                    return None;
                }
            };
            if key_len_valid(kv.key.len()) && kv.value.len() <= MAX_VALUE_LEN {
                state.cache.put(kv.key, kv.value);
                Some(ok_reply(kv.request_id))
            } else {
                tracing::debug!(%sender, key_len = kv.key.len(), value_len = kv.value.len(), "store rejected");
                Some(err_reply(kv.request_id))
            }
        }

        Command::Nodes => {
            let nodes = match Nodes::from_bytes(payload) {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse nodes payload");
                    return None;
                }
            };
            for peer in nodes.nodes {
                let Some(node_id) = NodeId::from_bytes(&peer.node_id) else {
                    continue;
                };
                let Ok(ip) = peer.ip.parse() else {
                    continue;
                };
                state.routing.add_node(node_id, ip, peer.port, peer.flags);
            }
            None
        }

        Command::FindNodes => {
            let key = match Key::from_bytes(payload) {
                Ok(k) => k,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse find-nodes payload");
                    return None;
                }
            };
            if !key_len_valid(key.key.len()) {
                return Some(err_reply(key.request_id));
            }
            Some(nodes_reply(state, key.request_id, &key.key))
        }

        Command::FindValue => {
            let key = match Key::from_bytes(payload) {
                Ok(k) => k,
                Err(e) => {
                    tracing::debug!(%sender, error = %e, "failed to parse find-value payload");
                    return None;
                }
            };
            if !key_len_valid(key.key.len()) {
                return Some(err_reply(key.request_id));
            }
            if let Some(value) = state.cache.get(&key.key) {
                let data = KeyValue {
                    request_id: key.request_id,
                    key: key.key.clone(),
                    value: value.clone(),
                };
                return Some((
                    Command::Data.as_str().to_string(),
                    data.to_bytes().expect("KeyValue payload always encodes"),
                ));
            }
            Some(nodes_reply(state, key.request_id, &key.key))
        }

        Command::Ok | Command::Err | Command::Data => {
            tracing::debug!(%sender, command = command.as_str(), "ignoring reply-only command sent inbound");
            None
        }

        Command::Unknown => {
            tracing::debug!(%sender, "unrecognized command, dropping");
            None
        }
    }
}
