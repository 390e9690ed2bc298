//! The node: owns the UDP socket and drives the server loop.
//!
//! Structured the same way the teacher's `SessionListener::run` is: a
//! single `tokio::select!` loop with one arm reading the socket and one
//! arm watching a shutdown broadcast, so the node can be told to stop
//! without ever dropping the socket mid-read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use dht_core::config::DhtConfig;
use dht_core::node_id::NodeId;
use dht_core::wire;

use crate::dispatch::{self, NodeState};

/// Largest datagram the node will read in one `recv_from`. Spec calls for
/// 2048 bytes; anything the kernel truncates to fit will fail codec
/// validation rather than silently losing the tail.
const RECV_BUFFER_LEN: usize = 2048;

/// The node's own lifecycle — a tagged variant rather than a string, so
/// the only two states are representable and exhaustively matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Open,
    Closed,
}

pub struct Node {
    socket: Arc<UdpSocket>,
    state: NodeState,
    status: Status,
    last_sent: Option<Instant>,
    /// Seed addresses from config whose node id isn't known yet — pinged
    /// directly by `bootstrap()`. Once a peer answers, its `pong` carries
    /// its real id and the dispatcher's `Pong` handler adds it to the
    /// routing table itself.
    bootstrap_addrs: Vec<SocketAddr>,
}

impl Node {
    /// Bind the configured address, load (or generate) the local node
    /// id, and record the configured bootstrap addresses for `bootstrap()`.
    pub async fn start(config: &DhtConfig) -> Result<Self> {
        let socket = UdpSocket::bind(&config.network.bind_addr)
            .await
            .with_context(|| format!("failed to bind {}", config.network.bind_addr))?;
        tracing::info!(addr = %socket.local_addr()?, "node bound");

        let local_id = load_or_create_node_id(&config.identity.node_id_path)?;
        tracing::info!(node_id = %local_id, "local identity loaded");

        let state = NodeState::new(local_id, config.routing.k, config.cache.capacity);

        let mut bootstrap_addrs = Vec::with_capacity(config.network.bootstrap_peers.len());
        for peer in &config.network.bootstrap_peers {
            match peer.parse::<SocketAddr>() {
                Ok(addr) => bootstrap_addrs.push(addr),
                Err(e) => tracing::warn!(peer, error = %e, "failed to parse bootstrap peer address"),
            }
        }

        Ok(Self {
            socket: Arc::new(socket),
            state,
            status: Status::Open,
            last_sent: None,
            bootstrap_addrs,
        })
    }

    pub fn local_id(&self) -> NodeId {
        self.state.local_id
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Send a `ping` with `request_id = 1` to every known active peer
    /// (skipping the local node's own id) plus every configured bootstrap
    /// address not yet in the table. Iterates the routing table's peer
    /// *values* — the source iterates a dict as if it held records
    /// directly, which is the bootstrap bug spec.md flags.
    pub async fn bootstrap(&mut self) -> Result<()> {
        let local_id = self.state.local_id;
        let ping = dht_core::message::Misc { request_id: 1 }
            .to_bytes()
            .map_err(anyhow::Error::from)?;

        let mut targets: Vec<SocketAddr> = self
            .state
            .routing
            .all_active_peers()
            .into_iter()
            .filter(|peer| peer.node_id != local_id)
            .map(|peer| SocketAddr::new(peer.addr, peer.port))
            .collect();
        targets.extend(self.bootstrap_addrs.iter().copied());

        for addr in targets {
            if let Err(e) = self.send("ping", &ping, addr).await {
                tracing::warn!(%addr, error = %e, "bootstrap ping failed");
            }
        }
        Ok(())
    }

    /// Run the server loop until `shutdown` fires or the socket fails.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];

        loop {
            if self.status == Status::Closed {
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("node shutting down");
                    self.status = Status::Closed;
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, sender)) => self.handle_datagram(&buf[..len], sender).await,
                        Err(e) => {
                            tracing::error!(error = %e, "recv_from failed, closing node");
                            self.status = Status::Closed;
                            return Err(e).context("recv_from failed");
                        }
                    }
                }
            }
        }
    }

    async fn handle_datagram(&mut self, datagram: &[u8], sender: SocketAddr) {
        let (command_name, payload) = match wire::decode(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(%sender, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        let command = dht_core::Command::from(command_name.as_str());
        let Some((reply_command, reply_payload)) =
            dispatch::dispatch(&mut self.state, command, payload, sender)
        else {
            return;
        };

        if let Err(e) = self.send(&reply_command, &reply_payload, sender).await {
            tracing::warn!(%sender, error = %e, "failed to send reply");
        }
    }

    async fn send(&mut self, command: &str, payload: &[u8], to: SocketAddr) -> Result<()> {
        let envelope = wire::encode(command, payload).map_err(anyhow::Error::from)?;
        self.socket.send_to(&envelope, to).await.context("sendto failed")?;
        self.last_sent = Some(Instant::now());
        Ok(())
    }
}

fn load_or_create_node_id(path: &std::path::Path) -> Result<NodeId> {
    if let Ok(bytes) = std::fs::read(path) {
        if let Some(id) = NodeId::from_bytes(&bytes) {
            return Ok(id);
        }
        tracing::warn!(path = %path.display(), "stored node id has unexpected length, regenerating");
    }

    let mut bytes = [0u8; NodeId::LEN];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(NodeId(bytes))
}
