//! ledgerd — ledger node daemon hosting the client authentication endpoint.

mod node;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use ledger_core::config::LedgerConfig;
use ledger_core::crypto::NodeKey;
use ledger_endpoint::{Endpoint, LocalNode, RosterNode};

fn main() -> Result<()> {
    // Initialise tracing — RUST_LOG controls verbosity
    // e.g. RUST_LOG=debug cargo run -p ledgerd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = LedgerConfig::write_default_if_missing()?;
    tracing::debug!(path = %config_path.display(), "config file");
    let config = LedgerConfig::load()?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all();
    if config.network.worker_threads > 0 {
        runtime.worker_threads(usize::from(config.network.worker_threads));
    }
    runtime.build()?.block_on(run(config))
}

async fn run(config: LedgerConfig) -> Result<()> {
    let node_key = load_or_generate_key(&config.identity.key_path)?;
    tracing::info!(
        public_key = %hex::encode(node_key.public_bytes()),
        "node identity loaded"
    );

    let roster = roster_nodes(&config)?;
    let backend: Arc<dyn LocalNode> = Arc::new(node::BasicNode::new(node_key.public_bytes()));
    let listen = SocketAddr::from(([0, 0, 0, 0], config.network.listen_port));

    let endpoint = Endpoint::start(node_key, listen, backend, roster).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    endpoint.shutdown().await;
    Ok(())
}

fn roster_nodes(config: &LedgerConfig) -> Result<Vec<RosterNode>> {
    config
        .roster
        .iter()
        .map(|entry| {
            Ok(RosterNode {
                name: entry.name.clone(),
                host: entry.host.clone(),
                client_port: entry.client_port,
                packed_key: entry.key_bytes()?,
            })
        })
        .collect()
}

/// Load the node key from disk, generating and persisting one on first run.
fn load_or_generate_key(path: &Path) -> Result<NodeKey> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let seed: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| anyhow!("node key file {} is corrupt", path.display()))?;
            Ok(NodeKey::from_seed(seed))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let key = NodeKey::generate();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(path, key.seed().as_slice())
                .with_context(|| format!("failed to write {}", path.display()))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
            }
            tracing::info!(path = %path.display(), "generated new node key");
            Ok(key)
        }
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
