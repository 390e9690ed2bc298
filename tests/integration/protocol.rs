//! End-to-end protocol scenarios against a single spawned `dhtd`, driven
//! entirely over its loopback UDP socket — one scenario per spec.md §8
//! end-to-end case.

use std::time::Duration;

use dht_core::message::{Key, KeyValue, Misc, Nodes, PeerRec, Pong};

use crate::*;

#[test]
fn ping_pong_echoes_request_id_and_node_id() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id(1), &[]).unwrap();

    let payload = Misc { request_id: 42 }.to_bytes().unwrap();
    let (command, reply) = round_trip(node.addr, "ping", &payload, REPLY_TIMEOUT).unwrap();

    assert_eq!(command, "pong");
    let pong = Pong::from_bytes(&reply).unwrap();
    assert_eq!(pong.request_id, 42);
    assert_eq!(pong.node_id, node.node_id.to_vec());
}

#[test]
fn store_then_find_value_round_trips() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id(2), &[]).unwrap();
    let key = id_from_u64(1).to_vec(); // 0x00...01, 32 bytes

    let store = KeyValue { request_id: 1, key: key.clone(), value: b"hi".to_vec() }.to_bytes().unwrap();
    let (command, reply) = round_trip(node.addr, "store", &store, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "ok");
    assert_eq!(Misc::from_bytes(&reply).unwrap().request_id, 1);

    let find = Key { request_id: 2, key }.to_bytes().unwrap();
    let (command, reply) = round_trip(node.addr, "find-value", &find, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "data");
    let data = KeyValue::from_bytes(&reply).unwrap();
    assert_eq!(data.value, b"hi");
    assert_eq!(data.request_id, 2);
}

#[test]
fn store_rejects_oversize_value_and_find_value_then_falls_back_to_nodes() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id(3), &[]).unwrap();
    let key = vec![0x02u8; 32];

    let store = KeyValue { request_id: 1, key: key.clone(), value: vec![0u8; 4097] }.to_bytes().unwrap();
    let (command, _) = round_trip(node.addr, "store", &store, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "err");

    let find = Key { request_id: 2, key }.to_bytes().unwrap();
    let (command, _) = round_trip(node.addr, "find-value", &find, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "nodes", "a cache miss falls back to the find-nodes reply shape");
}

#[test]
fn bad_checksum_is_dropped_silently_and_state_is_unchanged() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id(4), &[]).unwrap();
    let key = vec![0x03u8; 32];

    let mut envelope = dht_core::wire::encode(
        "store",
        &KeyValue { request_id: 1, key: key.clone(), value: b"hello".to_vec() }.to_bytes().unwrap(),
    )
    .unwrap();
    let last = envelope.len() - 1;
    envelope[last] ^= 0x01; // flip a payload bit without touching the checksum

    expect_no_reply(node.addr, &envelope, Duration::from_millis(300)).unwrap();

    // State is unchanged: the corrupted store never landed, so find-value
    // reports a cache miss.
    let find = Key { request_id: 2, key }.to_bytes().unwrap();
    let (command, _) = round_trip(node.addr, "find-value", &find, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "nodes");
}

#[test]
fn find_nodes_orders_seeded_peers_by_xor_distance() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id_from_u64(0), &[]).unwrap();

    // Gossip a batch of peers into the node's routing table the same way
    // a real peer's unsolicited `nodes` message would.
    let seeded_ids: Vec<u64> = vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 1 << 30];
    let peers: Vec<PeerRec> = seeded_ids
        .iter()
        .enumerate()
        .map(|(i, &n)| PeerRec {
            node_id: id_from_u64(n).to_vec(),
            ip: "127.0.0.1".to_string(),
            port: 20000 + i as u16,
            flags: 0,
        })
        .collect();
    let gossip = Nodes { request_id: 0, nodes: peers }.to_bytes().unwrap();
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(&dht_core::wire::encode("nodes", &gossip).unwrap(), node.addr).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let find_zero = Key { request_id: 1, key: id_from_u64(0).to_vec() }.to_bytes().unwrap();
    let (_, reply) = round_trip(node.addr, "find-nodes", &find_zero, REPLY_TIMEOUT).unwrap();
    let nodes = Nodes::from_bytes(&reply).unwrap();
    assert_eq!(nodes.nodes[0].node_id, id_from_u64(1).to_vec());
    assert_eq!(nodes.nodes[1].node_id, id_from_u64(2).to_vec());
    assert_eq!(nodes.nodes[2].node_id, id_from_u64(4).to_vec());

    let find_five = Key { request_id: 2, key: id_from_u64(5).to_vec() }.to_bytes().unwrap();
    let (_, reply) = round_trip(node.addr, "find-nodes", &find_five, REPLY_TIMEOUT).unwrap();
    let nodes = Nodes::from_bytes(&reply).unwrap();
    // id(5) == 0b101; id(4) == 0b100 is its closest XOR neighbor (distance 1).
    assert_eq!(nodes.nodes[0].node_id, id_from_u64(4).to_vec());
}

#[test]
fn duplicate_add_node_is_idempotent() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id_from_u64(0), &[]).unwrap();
    let peer = PeerRec { node_id: id_from_u64(9).to_vec(), ip: "127.0.0.1".to_string(), port: 21000, flags: 0 };

    let gossip = Nodes { request_id: 0, nodes: vec![peer.clone(), peer.clone(), peer] }.to_bytes().unwrap();
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.send_to(&dht_core::wire::encode("nodes", &gossip).unwrap(), node.addr).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let find = Key { request_id: 1, key: id_from_u64(9).to_vec() }.to_bytes().unwrap();
    let (_, reply) = round_trip(node.addr, "find-nodes", &find, REPLY_TIMEOUT).unwrap();
    let nodes = Nodes::from_bytes(&reply).unwrap();
    assert_eq!(nodes.nodes.len(), 1, "re-adding the same (ip, port, id) must not duplicate the peer");
}

#[test]
fn find_nodes_rejects_bad_key_length() {
    let _lock = DAEMON_LOCK.lock().unwrap();
    let node = spawn_node(id(5), &[]).unwrap();
    let payload = Key { request_id: 1, key: vec![0u8; 5] }.to_bytes().unwrap();
    let (command, _) = round_trip(node.addr, "find-nodes", &payload, REPLY_TIMEOUT).unwrap();
    assert_eq!(command, "err");
}
