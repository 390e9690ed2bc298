//! The Kademlia-style routing table: peers bucketed by shared id prefix
//! length, looked up by XOR distance.
//!
//! Each bucket holds up to `k` active peers plus an overflow of
//! candidates waiting for a slot. A peer is promoted from candidate to
//! active the moment an active slot frees up and the promotion is
//! noticed — the table itself never evicts a live active peer to make
//! room, since a peer that's still answering has no reason to be
//! dropped.

use std::collections::HashMap;
use std::net::IpAddr;

use dht_core::node_id::{matching_bits, NodeId, NODE_ID_BITS};

/// Number of prefix-length buckets. One per possible shared-bit count
/// over the full identifier width (a peer sharing all 256 bits with the
/// local id would be the local id itself, and is rejected rather than
/// bucketed).
pub const BUCKET_COUNT: usize = NODE_ID_BITS;

/// A single known peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub node_id: NodeId,
    pub addr: IpAddr,
    pub port: u16,
    pub flags: u32,
    /// Monotonic tick of the last time this peer was confirmed alive
    /// (a `pong`, or any other authenticating reply). Not a wall-clock
    /// timestamp — the table doesn't care what time it is, only relative
    /// recency.
    pub last_seen: u64,
}

/// One bucket: up to `k` active peers, plus candidates waiting for room.
#[derive(Debug, Default)]
struct Bucket {
    active: Vec<PeerRecord>,
    candidates: Vec<PeerRecord>,
}

/// Outcome of an [`RoutingTable::add_node`] call, useful for tests and
/// for callers that want to log what happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The peer is new and now sits in a bucket's active list.
    AddedActive,
    /// The peer is new but its bucket's active list was full; it now
    /// waits as a candidate.
    AddedCandidate,
    /// The peer was already known; its record was refreshed in place.
    Refreshed,
    /// `node_id` was the local node's own id.
    RejectedSelf,
    /// `port` was outside `[1, 65535]`.
    RejectedInvalidPort,
}

/// The routing table for one local node.
pub struct RoutingTable {
    local_id: NodeId,
    k: usize,
    buckets: Vec<Bucket>,
    /// Every `(ip, port)` ever added, mapped to the node id that owns it —
    /// spans all buckets, so a re-add of a known address is caught even
    /// when the claimed node id would land in a different bucket.
    by_addr: HashMap<(IpAddr, u16), NodeId>,
    clock: u64,
}

impl RoutingTable {
    pub fn new(local_id: NodeId, k: usize) -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        buckets.resize_with(BUCKET_COUNT, Bucket::default);
        Self {
            local_id,
            k: k.max(1),
            buckets,
            by_addr: HashMap::new(),
            clock: 0,
        }
    }

    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn bucket_index(&self, node_id: &NodeId) -> Option<usize> {
        let shared = matching_bits(&self.local_id, node_id);
        if shared >= BUCKET_COUNT {
            // Identical to the local id — not a peer.
            return None;
        }
        Some(shared)
    }

    /// Add or refresh a peer. Rejects the local node's own id, a port
    /// outside `[1, 65535]`, and re-additions of a previously seen
    /// `(ip, port)` (refreshed in place instead, regardless of which
    /// bucket the address's owner lives in).
    pub fn add_node(&mut self, node_id: NodeId, addr: IpAddr, port: u16, flags: u32) -> AddOutcome {
        if port == 0 {
            return AddOutcome::RejectedInvalidPort;
        }
        let Some(idx) = self.bucket_index(&node_id) else {
            return AddOutcome::RejectedSelf;
        };

        if let Some(&existing_id) = self.by_addr.get(&(addr, port)) {
            let seen = self.tick();
            let existing_idx = self
                .bucket_index(&existing_id)
                .expect("an address owner is never the local id");
            let bucket = &mut self.buckets[existing_idx];
            if let Some(p) = bucket.active.iter_mut().find(|p| p.node_id == existing_id) {
                p.last_seen = seen;
                p.flags = flags;
                return AddOutcome::Refreshed;
            }
            if let Some(p) = bucket.candidates.iter_mut().find(|p| p.node_id == existing_id) {
                p.last_seen = seen;
                p.flags = flags;
                return AddOutcome::Refreshed;
            }
            // by_addr outlived its record (e.g. remove_active dropped the
            // active entry without a matching address); fall through and
            // treat this as a fresh add.
        }

        let seen = self.tick();
        let k = self.k;
        let bucket = &mut self.buckets[idx];

        if let Some(existing) = bucket.active.iter_mut().find(|p| p.node_id == node_id) {
            let old_addr = (existing.addr, existing.port);
            existing.addr = addr;
            existing.port = port;
            existing.last_seen = seen;
            existing.flags = flags;
            if old_addr != (addr, port) {
                self.by_addr.remove(&old_addr);
                self.by_addr.insert((addr, port), node_id);
            }
            return AddOutcome::Refreshed;
        }
        if let Some(existing) = bucket.candidates.iter_mut().find(|p| p.node_id == node_id) {
            let old_addr = (existing.addr, existing.port);
            existing.addr = addr;
            existing.port = port;
            existing.last_seen = seen;
            existing.flags = flags;
            if old_addr != (addr, port) {
                self.by_addr.remove(&old_addr);
                self.by_addr.insert((addr, port), node_id);
            }
            return AddOutcome::Refreshed;
        }

        let record = PeerRecord {
            node_id,
            addr,
            port,
            flags,
            last_seen: seen,
        };

        self.by_addr.insert((addr, port), node_id);

        if bucket.active.len() < k && node_id != NodeId::ZERO {
            bucket.active.push(record);
            AddOutcome::AddedActive
        } else {
            bucket.candidates.push(record);
            AddOutcome::AddedCandidate
        }
    }

    /// Mark `node_id` alive, refreshing `last_seen` and — if its bucket's
    /// active list has a vacant slot — promoting it (or, if it's not
    /// already known, the most-recently-seen waiting candidate) into
    /// that slot.
    ///
    /// This is the promotion step the original source never implements:
    /// candidates would accumulate forever with no path back to active.
    pub fn note_alive(&mut self, node_id: &NodeId) {
        let Some(idx) = self.bucket_index(node_id) else {
            return;
        };
        let seen = self.tick();
        let k = self.k;
        let bucket = &mut self.buckets[idx];

        if let Some(active) = bucket.active.iter_mut().find(|p| &p.node_id == node_id) {
            active.last_seen = seen;
            return;
        }

        if let Some(pos) = bucket.candidates.iter().position(|p| &p.node_id == node_id) {
            bucket.candidates[pos].last_seen = seen;
        }

        if bucket.active.len() >= k || bucket.candidates.is_empty() {
            return;
        }

        let promote_pos = bucket
            .candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.last_seen)
            .map(|(i, _)| i)
            .expect("checked non-empty above");
        let promoted = bucket.candidates.remove(promote_pos);
        bucket.active.push(promoted);
    }

    /// The `limit` peers closest to `key` by XOR distance, across all
    /// active peers in the table (candidates are not returned — they
    /// haven't proven themselves reachable yet).
    pub fn find_nodes(&self, key: &NodeId, limit: usize) -> Vec<PeerRecord> {
        let mut all: Vec<&PeerRecord> = self.buckets.iter().flat_map(|b| b.active.iter()).collect();
        all.sort_by_key(|p| p.node_id.xor(key));
        all.into_iter().take(limit).cloned().collect()
    }

    /// Drop `node_id` from its bucket's active list — e.g. after it fails
    /// to answer a health-check ping — making room for the next
    /// `note_alive` call to promote a waiting candidate. Returns whether
    /// a peer was actually removed.
    pub fn remove_active(&mut self, node_id: &NodeId) -> bool {
        let Some(idx) = self.bucket_index(node_id) else {
            return false;
        };
        let bucket = &mut self.buckets[idx];
        let before = bucket.active.len();
        bucket.active.retain(|p| &p.node_id != node_id);
        bucket.active.len() != before
    }

    /// Every active peer in the table, in no particular order — used for
    /// the bootstrap ping round.
    pub fn all_active_peers(&self) -> Vec<PeerRecord> {
        self.buckets.iter().flat_map(|b| b.active.iter().cloned()).collect()
    }

    pub fn active_len(&self) -> usize {
        self.buckets.iter().map(|b| b.active.len()).sum()
    }

    pub fn candidate_len(&self) -> usize {
        self.buckets.iter().map(|b| b.candidates.len()).sum()
    }
}
