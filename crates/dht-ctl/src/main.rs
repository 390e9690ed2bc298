//! dht-ctl — a companion CLI that speaks the wire protocol directly to a
//! running `dhtd`, one envelope per invocation.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;

use dht_core::message::{Key, KeyValue, Misc, Nodes, Pong};
use dht_core::wire;

const REPLY_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_ID: u64 = 1;

fn print_usage() {
    println!("Usage: dht-ctl --addr <peer host:port> <command>");
    println!();
    println!("Commands");
    println!("  ping                      Send a ping, print the pong reply");
    println!("  store <key-hex> <value>  Store a value under a hex-encoded key");
    println!("  find-nodes <key-hex>      Ask for the peers closest to a key");
    println!("  find-value <key-hex>      Ask for a value, falling back to peers");
    println!();
    println!("Examples:");
    println!("  dht-ctl --addr 127.0.0.1:9000 ping");
    println!("  dht-ctl --addr 127.0.0.1:9000 store 0011...(32 bytes hex) hello");
    println!("  dht-ctl --addr 127.0.0.1:9000 find-value 0011...(32 bytes hex)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();

    let mut addr: Option<SocketAddr> = None;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < raw_args.len() {
        if raw_args[i] == "--addr" {
            i += 1;
            let value = raw_args.get(i).context("--addr requires a value")?;
            addr = Some(value.parse().context("--addr must be host:port")?);
        } else {
            remaining.push(raw_args[i].clone());
        }
        i += 1;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    if matches!(remaining_refs.as_slice(), ["help"] | ["--help"] | ["-h"]) {
        print_usage();
        return Ok(());
    }

    let addr = match addr {
        Some(addr) => addr,
        None => {
            eprintln!("missing required --addr");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    match remaining_refs.as_slice() {
        ["ping"] => cmd_ping(addr).await,
        ["store", key_hex, value] => cmd_store(addr, key_hex, value).await,
        ["find-nodes", key_hex] => cmd_find_nodes(addr, key_hex).await,
        ["find-value", key_hex] => cmd_find_value(addr, key_hex).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

/// Bind an ephemeral local socket, send one envelope to `addr`, and wait
/// for exactly one reply.
async fn round_trip(addr: SocketAddr, command: &str, payload: &[u8]) -> Result<(String, Vec<u8>)> {
    let socket = UdpSocket::bind("0.0.0.0:0").await.context("failed to bind local socket")?;
    let envelope = wire::encode(command, payload)?;
    socket.send_to(&envelope, addr).await.context("failed to send")?;

    let mut buf = vec![0u8; 2048];
    let len = tokio::time::timeout(REPLY_TIMEOUT, socket.recv(&mut buf))
        .await
        .context("timed out waiting for a reply")?
        .context("failed to receive reply")?;

    let (reply_command, reply_payload) = wire::decode(&buf[..len])?;
    Ok((reply_command, reply_payload.to_vec()))
}

async fn cmd_ping(addr: SocketAddr) -> Result<()> {
    let payload = Misc { request_id: REQUEST_ID }.to_bytes()?;
    let (command, reply) = round_trip(addr, "ping", &payload).await?;
    if command != "pong" {
        bail!("expected pong, got {command}");
    }
    let pong = Pong::from_bytes(&reply)?;
    println!("pong request_id={} node_id={}", pong.request_id, hex::encode(&pong.node_id));
    Ok(())
}

async fn cmd_store(addr: SocketAddr, key_hex: &str, value: &str) -> Result<()> {
    let key = hex::decode(key_hex).context("key must be hex-encoded")?;
    let payload = KeyValue {
        request_id: REQUEST_ID,
        key,
        value: value.as_bytes().to_vec(),
    }
    .to_bytes()?;
    let (command, _reply) = round_trip(addr, "store", &payload).await?;
    println!("{command}");
    Ok(())
}

async fn cmd_find_nodes(addr: SocketAddr, key_hex: &str) -> Result<()> {
    let key = hex::decode(key_hex).context("key must be hex-encoded")?;
    let payload = Key { request_id: REQUEST_ID, key }.to_bytes()?;
    let (command, reply) = round_trip(addr, "find-nodes", &payload).await?;
    if command != "nodes" {
        bail!("expected nodes, got {command}");
    }
    print_nodes(&Nodes::from_bytes(&reply)?);
    Ok(())
}

async fn cmd_find_value(addr: SocketAddr, key_hex: &str) -> Result<()> {
    let key = hex::decode(key_hex).context("key must be hex-encoded")?;
    let payload = Key { request_id: REQUEST_ID, key }.to_bytes()?;
    let (command, reply) = round_trip(addr, "find-value", &payload).await?;
    match command.as_str() {
        "data" => {
            let data = KeyValue::from_bytes(&reply)?;
            println!("data key={} value={:?}", hex::encode(&data.key), String::from_utf8_lossy(&data.value));
        }
        "nodes" => print_nodes(&Nodes::from_bytes(&reply)?),
        other => bail!("unexpected reply command {other}"),
    }
    Ok(())
}

fn print_nodes(nodes: &Nodes) {
    println!("nodes request_id={}", nodes.request_id);
    for peer in &nodes.nodes {
        println!(
            "  {} {}:{} flags={}",
            hex::encode(&peer.node_id),
            peer.ip,
            peer.port,
            peer.flags
        );
    }
}
