//! Session registry — concurrent lookup by client key and by session id.
//!
//! Both maps hold the same `Arc<Mutex<ClientSession>>`; creation is
//! serialized on a registry-wide mutex so one client key never yields two
//! records, while lookups stay lock-free. Records live for the process
//! lifetime.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;

use ledger_core::crypto::ClientKey;
use ledger_core::error::{ErrorCode, ErrorRecord};

use crate::session::ClientSession;

pub type SharedSession = Arc<Mutex<ClientSession>>;

pub struct SessionRegistry {
    by_key: DashMap<Vec<u8>, SharedSession>,
    by_id: DashMap<i64, SharedSession>,
    /// Serializes creation so invariant "one record per client key" holds
    /// under concurrent `/connect` calls.
    create_lock: Mutex<()>,
    next_id: AtomicI64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        // Ids start at process-start epoch seconds plus a small random
        // offset. A handle, not a secret.
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(1);
        let seed = epoch + rand::thread_rng().gen_range(0..4096);
        Self {
            by_key: DashMap::new(),
            by_id: DashMap::new(),
            create_lock: Mutex::new(()),
            next_id: AtomicI64::new(seed),
        }
    }

    /// Look up the session for a client key, creating it on first sight.
    /// The key must parse; a malformed key never creates a record.
    pub async fn get_or_create(&self, key_bytes: &[u8]) -> Result<SharedSession, ErrorRecord> {
        if let Some(existing) = self.by_key.get(key_bytes) {
            return Ok(existing.value().clone());
        }

        let _guard = self.create_lock.lock().await;
        if let Some(existing) = self.by_key.get(key_bytes) {
            return Ok(existing.value().clone());
        }

        let client_key = ClientKey::parse(key_bytes).map_err(|e| {
            ErrorRecord::new(ErrorCode::BadClientKey, "client_key", e.to_string())
        })?;

        let session_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Mutex::new(ClientSession::new(
            client_key,
            key_bytes.to_vec(),
            session_id,
        )));
        self.by_key.insert(key_bytes.to_vec(), session.clone());
        self.by_id.insert(session_id, session.clone());
        tracing::info!(
            session_id,
            client_key = %hex::encode(&key_bytes[..8.min(key_bytes.len())]),
            "session created"
        );
        Ok(session)
    }

    pub fn get_by_id(&self, session_id: i64) -> Option<SharedSession> {
        self.by_id.get(&session_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Key rotation: expire the session key for a client, if a session
    /// exists. Returns whether one did.
    pub async fn expire_key_for(&self, key_bytes: &[u8]) -> bool {
        let session = self.by_key.get(key_bytes).map(|s| s.value().clone());
        match session {
            Some(session) => {
                session.lock().await.expire_key();
                true
            }
            None => false,
        }
    }
}
