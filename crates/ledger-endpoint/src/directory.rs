//! The `/network` directory — the injected roster, packed once on first
//! request and served from the cache afterwards.

use std::sync::OnceLock;

use bytes::Bytes;

use ledger_core::codec::Payload;

/// One peer node as exposed to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterNode {
    pub name: String,
    pub host: String,
    pub client_port: u16,
    pub packed_key: Vec<u8>,
}

pub struct NetworkDirectory {
    roster: Vec<RosterNode>,
    packed: OnceLock<Bytes>,
}

impl NetworkDirectory {
    pub fn new(roster: Vec<RosterNode>) -> Self {
        Self {
            roster,
            packed: OnceLock::new(),
        }
    }

    /// The packed directory map `{name: {port, ip, key}}`. Built once;
    /// every later call returns the published bytes.
    pub fn packed(&self) -> Bytes {
        self.packed
            .get_or_init(|| {
                let mut dir = Payload::new();
                for node in &self.roster {
                    let mut entry = Payload::new();
                    entry.set_long("port", i64::from(node.client_port));
                    entry.set_str("ip", &node.host);
                    entry.set_bytes("key", node.packed_key.clone());
                    dir.set_map(&node.name, entry);
                }
                match dir.pack() {
                    Ok(bytes) => {
                        tracing::debug!(nodes = self.roster.len(), "network directory built");
                        Bytes::from(bytes)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to pack network directory");
                        Bytes::new()
                    }
                }
            })
            .clone()
    }
}
