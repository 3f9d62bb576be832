//! ledger-endpoint — the node's client authentication endpoint.
//!
//! Serves the handshake (`/connect`, `/get_token`) and the authenticated
//! command envelope (`/command`) over multipart HTTP, plus the
//! unauthenticated `/ping` and `/network` helpers. All per-client state
//! lives in the in-memory session registry and dies with the process.

pub mod command;
pub mod directory;
mod handlers;
pub mod registry;
pub mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use ledger_core::crypto::NodeKey;

pub use command::{LocalNode, NodeError};
pub use directory::RosterNode;
pub use handlers::MAX_REQUEST_BYTES;

use directory::NetworkDirectory;
use registry::SessionRegistry;

/// Shared state behind every request handler.
pub struct EndpointState {
    pub(crate) node_key: NodeKey,
    pub(crate) registry: SessionRegistry,
    pub(crate) backend: Arc<dyn LocalNode>,
    pub(crate) directory: NetworkDirectory,
}

/// The running endpoint: owns the listener task and the shutdown handle.
pub struct Endpoint {
    state: Arc<EndpointState>,
    local_addr: SocketAddr,
    shutdown_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Bind the listener and start serving. Pass port 0 to let the OS pick.
    pub async fn start(
        node_key: NodeKey,
        listen: SocketAddr,
        backend: Arc<dyn LocalNode>,
        roster: Vec<RosterNode>,
    ) -> Result<Self> {
        let state = Arc::new(EndpointState {
            node_key,
            registry: SessionRegistry::new(),
            backend,
            directory: NetworkDirectory::new(roster),
        });

        let app = handlers::router(state.clone());
        let listener = tokio::net::TcpListener::bind(listen).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "endpoint server error");
            }
        });

        tracing::info!(%local_addr, "client endpoint listening");
        Ok(Self {
            state,
            local_addr,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The node's public signing key, for clients to pin.
    pub fn node_public_key(&self) -> [u8; 32] {
        self.state.node_key.public_bytes()
    }

    /// Number of live client sessions.
    pub fn session_count(&self) -> usize {
        self.state.registry.len()
    }

    /// Key rotation hook: expire the session key for a client public key.
    /// The next `/command` fails until the client re-runs the handshake.
    pub async fn expire_key_for(&self, client_key: &[u8]) -> bool {
        self.state.registry.expire_key_for(client_key).await
    }

    /// Stop accepting connections and wait for the server task. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
            tracing::info!("client endpoint stopped");
        }
    }
}
