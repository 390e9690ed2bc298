//! DHT node integration harness.
//!
//! Tests in this file spawn real `dhtd` processes bound to loopback UDP
//! sockets and exercise them exactly as a remote peer would: by encoding
//! and decoding wire envelopes with `dht-core`, the same crate `dhtd`
//! itself uses. No mocks of the codec, dispatcher, or routing table —
//! these are black-box, over-the-wire scenarios.
//!
//! Daemon-spawning tests are serialized via `DAEMON_LOCK` so they don't
//! race over loopback ports.

mod protocol;

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dht_core::message::Misc;
use dht_core::wire;

/// Serializes all daemon-spawning tests so they don't race over loopback
/// ports bound in the same small range.
pub static DAEMON_LOCK: Mutex<()> = Mutex::new(());

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

fn dhtd_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target/debug/dhtd")
}

/// Next loopback port to bind a spawned node to. Tests run serialized
/// under `DAEMON_LOCK`, but handing out a fresh port per node still
/// avoids a `TIME_WAIT`-adjacent flake if a prior test's socket lingers.
fn next_port() -> u16 {
    static NEXT: AtomicU16 = AtomicU16::new(19001);
    NEXT.fetch_add(1, Ordering::SeqCst)
}

/// A running `dhtd` under test, killed when dropped.
pub struct TestNode {
    child: Child,
    pub addr: SocketAddr,
    pub node_id: [u8; 32],
    _tmp: tempfile::TempDir,
}

impl Drop for TestNode {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Spawn a `dhtd` bound to loopback with a known, caller-chosen node id
/// and (optionally) a bootstrap peer list, then block until it answers a
/// `ping`.
pub fn spawn_node(node_id: [u8; 32], bootstrap: &[SocketAddr]) -> Result<TestNode> {
    let tmp = tempfile::Builder::new().prefix("dht-integration").tempdir()?;
    let port = next_port();
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let id_path = tmp.path().join("node_id");
    std::fs::write(&id_path, node_id)?;

    let config_path = tmp.path().join("config.toml");
    let bootstrap_list = bootstrap
        .iter()
        .map(|a| format!("\"{a}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let config_text = format!(
        "[identity]\nnode_id_path = {id_path:?}\n\n\
         [network]\nbind_addr = \"{addr}\"\n\
         bootstrap_peers = [{bootstrap_list}]\n"
    );
    std::fs::File::create(&config_path)?.write_all(config_text.as_bytes())?;

    let child = Command::new(dhtd_path())
        .env("DHT_CONFIG", &config_path)
        .spawn()
        .context("failed to spawn dhtd — run `cargo build` first")?;

    let node = TestNode {
        child,
        addr,
        node_id,
        _tmp: tmp,
    };
    wait_until_ready(node.addr)?;
    Ok(node)
}

/// Poll a node with `ping` until it replies or we give up.
fn wait_until_ready(addr: SocketAddr) -> Result<()> {
    for _ in 0..50 {
        if round_trip(addr, "ping", &Misc { request_id: 0 }.to_bytes()?, Duration::from_millis(100)).is_ok() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    bail!("node at {addr} never answered a ping")
}

/// Send one envelope to `addr` from a fresh ephemeral socket and wait for
/// exactly one reply.
pub fn round_trip(addr: SocketAddr, command: &str, payload: &[u8], timeout: Duration) -> Result<(String, Vec<u8>)> {
    let socket = UdpSocket::bind("127.0.0.1:0").context("failed to bind local socket")?;
    socket.set_read_timeout(Some(timeout))?;
    let envelope = wire::encode(command, payload)?;
    socket.send_to(&envelope, addr).context("failed to send")?;

    let mut buf = vec![0u8; 2048];
    let len = socket.recv(&mut buf).context("timed out waiting for a reply")?;
    let (reply_command, reply_payload) = wire::decode(&buf[..len])?;
    Ok((reply_command, reply_payload.to_vec()))
}

/// Send one envelope's raw bytes and assert nothing comes back within
/// `timeout` — used for frame/integrity failures the node must silently
/// drop rather than reply to.
pub fn expect_no_reply(addr: SocketAddr, raw_envelope: &[u8], timeout: Duration) -> Result<()> {
    let socket = UdpSocket::bind("127.0.0.1:0")?;
    socket.set_read_timeout(Some(timeout))?;
    socket.send_to(raw_envelope, addr)?;

    let mut buf = vec![0u8; 2048];
    match socket.recv(&mut buf) {
        Ok(len) => bail!("expected no reply, got {} bytes", len),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub fn id(n: u8) -> [u8; 32] {
    [n; 32]
}

/// A big-endian node id with `n` stored in the low 8 bytes, matching the
/// fixture style each component crate's own unit tests use for
/// `find-nodes` ordering scenarios.
pub fn id_from_u64(n: u64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    bytes
}
