//! Configuration system for the ledger node.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $LEDGER_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/ledgerd/config.toml
//!   3. ~/.config/ledgerd/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    /// Peer nodes exposed via `/network`.
    pub roster: Vec<RosterEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to the node's Ed25519 seed. Auto-generated on first run.
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port for the client endpoint.
    pub listen_port: u16,
    /// Runtime worker threads. 0 = one per available core.
    pub worker_threads: u16,
}

/// One peer node in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Stable node name, the key in the `/network` directory.
    pub name: String,
    /// Address clients should dial.
    pub host: String,
    pub client_port: u16,
    /// Hex-encoded packed public key of the peer.
    pub key: String,
}

impl RosterEntry {
    pub fn key_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        hex::decode(&self.key)
            .map_err(|_| ConfigError::InvalidRosterKey(self.name.clone()))
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            network: NetworkConfig::default(),
            roster: Vec::new(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_path: config_dir().join("node.key"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: 2052,
            worker_threads: 16,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_or_tmp().join(".config"))
        .join("ledgerd")
}

fn home_or_tmp() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("roster entry {0}: key is not valid hex")]
    InvalidRosterKey(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LedgerConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            LedgerConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("LEDGER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&LedgerConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply LEDGER_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LEDGER_NETWORK__LISTEN_PORT") {
            if let Ok(p) = v.parse() {
                self.network.listen_port = p;
            }
        }
        if let Ok(v) = std::env::var("LEDGER_NETWORK__WORKER_THREADS") {
            if let Ok(n) = v.parse() {
                self.network.worker_threads = n;
            }
        }
        if let Ok(v) = std::env::var("LEDGER_IDENTITY__KEY_PATH") {
            self.identity.key_path = PathBuf::from(v);
        }
    }
}
