//! The in-process command backend wired into the endpoint.

use ciborium::value::Value;

use ledger_core::codec::Payload;
use ledger_endpoint::{LocalNode, NodeError};

/// Minimal backend: version and identity queries. Real node logic hangs
/// off this same seam.
pub struct BasicNode {
    public_key: [u8; 32],
}

impl BasicNode {
    pub fn new(public_key: [u8; 32]) -> Self {
        Self { public_key }
    }
}

impl LocalNode for BasicNode {
    fn execute(&self, command: &str, _params: &Payload) -> Result<Value, NodeError> {
        match command {
            "version" => {
                let mut result = Payload::new();
                result.set_str("version", env!("CARGO_PKG_VERSION"));
                Ok(result.into_value())
            }
            "node_info" => {
                let mut result = Payload::new();
                result.set_bytes("public_key", self.public_key.to_vec());
                result.set_str("version", env!("CARGO_PKG_VERSION"));
                Ok(result.into_value())
            }
            other => Err(NodeError::UnknownCommand(other.to_string())),
        }
    }
}
