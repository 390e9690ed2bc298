//! dhtd — the DHT node daemon.

mod dispatch;
mod node;

use anyhow::Result;
use tokio::sync::broadcast;

use dht_core::config::DhtConfig;
use node::Node;

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=debug cargo run -p dhtd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = parse_args();

    if let Some(path) = &args.config_path {
        std::env::set_var("DHT_CONFIG", path);
    }
    let mut config = DhtConfig::load()?;
    if let Some(bind_addr) = args.bind_addr {
        config.network.bind_addr = bind_addr;
    }

    tracing::info!(bind_addr = %config.network.bind_addr, "dhtd starting");

    let mut node = Node::start(&config).await?;
    tracing::info!(node_id = %node.local_id(), addr = %node.local_addr()?, "node ready");

    if let Err(e) = node.bootstrap().await {
        tracing::warn!(error = %e, "bootstrap round failed");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let shutdown_signal = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c, shutting down");
        let _ = shutdown_tx.send(());
    });

    tokio::select! {
        r = node.run(shutdown_rx) => {
            if let Err(e) = r {
                tracing::error!(error = %e, "node loop exited with error");
            }
        }
        _ = shutdown_signal => {}
    }

    Ok(())
}

struct Args {
    config_path: Option<String>,
    bind_addr: Option<String>,
}

/// Hand-rolled flag parsing: `--config <path>`, `--bind <addr>`. No
/// `clap` — this daemon's own binaries have never needed more than a
/// couple of flags.
fn parse_args() -> Args {
    let mut args = Args {
        config_path: None,
        bind_addr: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(flag) = iter.next() {
        match flag.as_str() {
            "--config" => args.config_path = iter.next(),
            "--bind" => args.bind_addr = iter.next(),
            other => tracing::warn!(flag = other, "ignoring unrecognized argument"),
        }
    }
    args
}
