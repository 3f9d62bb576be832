//! End-to-end tests for the client authentication endpoint.
//!
//! Each test starts its own endpoint on an ephemeral port and drives it
//! through real multipart HTTP, exactly as a remote client would.

mod client;
mod commands;
mod handshake;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use ciborium::value::Value;

use ledger_core::codec::Payload;
use ledger_core::crypto::NodeKey;
use ledger_endpoint::{Endpoint, LocalNode, NodeError, RosterNode};

use client::TestClient;

/// Backend wired into test endpoints: one custom command so the
/// delegation seam is exercised end to end.
struct TestBackend;

impl LocalNode for TestBackend {
    fn execute(&self, command: &str, _params: &Payload) -> Result<Value, NodeError> {
        match command {
            "backend_status" => {
                let mut result = Payload::new();
                result.set_str("backend", "ready");
                Ok(result.into_value())
            }
            other => Err(NodeError::UnknownCommand(other.to_string())),
        }
    }
}

pub fn test_roster() -> Vec<RosterNode> {
    vec![RosterNode {
        name: "N1".into(),
        host: "1.2.3.4".into(),
        client_port: 7000,
        packed_key: vec![0xaa; 64],
    }]
}

pub async fn spawn_endpoint() -> Result<(Endpoint, TestClient)> {
    let node_key = NodeKey::generate();
    let listen: SocketAddr = "127.0.0.1:0".parse()?;
    let endpoint = Endpoint::start(node_key, listen, Arc::new(TestBackend), test_roster()).await?;
    let client = TestClient::new(endpoint.local_addr());
    Ok((endpoint, client))
}
