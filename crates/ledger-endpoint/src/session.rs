//! Per-client session state: the handshake and its error accumulator.
//!
//! A session moves through three states, tracked implicitly by its fields:
//! fresh (no server nonce), nonce issued (`connect` ran), and keyed
//! (`get_token` verified the client's reply and a session key is cached).
//! `expire_key` knocks a keyed session back to nonce-issued: the cached key
//! material stays usable for encrypting the failure reply, but commands
//! refuse to run until the client repeats the handshake.

use ledger_core::codec::Payload;
use ledger_core::crypto::{self, ClientKey, NodeKey, SessionKey, SERVER_NONCE_LEN};
use ledger_core::error::{error_list_value, ErrorCode, ErrorRecord};

#[derive(Debug)]
pub struct ClientSession {
    client_key: ClientKey,
    key_bytes: Vec<u8>,
    session_id: i64,
    server_nonce: Option<[u8; SERVER_NONCE_LEN]>,
    session_key: Option<SessionKey>,
    encrypted_answer: Option<Vec<u8>>,
    key_expired: bool,
    errors: Vec<ErrorRecord>,
}

impl ClientSession {
    pub fn new(client_key: ClientKey, key_bytes: Vec<u8>, session_id: i64) -> Self {
        Self {
            client_key,
            key_bytes,
            session_id,
            server_nonce: None,
            session_key: None,
            encrypted_answer: None,
            key_expired: false,
            errors: Vec::new(),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// The packed client key exactly as it was presented on `/connect`.
    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn key_expired(&self) -> bool {
        self.key_expired
    }

    fn is_keyed(&self) -> bool {
        self.session_key.is_some() && !self.key_expired
    }

    // ── Error accumulator ─────────────────────────────────────────────────────

    /// Called by the router at the start of every request on this session.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn add_error(&mut self, record: ErrorRecord) {
        tracing::warn!(session_id = self.session_id, error = %record, "session error");
        self.errors.push(record);
    }

    /// Merge accumulated errors into the handler result. A `None` result
    /// becomes an empty map (plus errors, if any).
    pub fn answer(&mut self, result: Option<Payload>) -> Payload {
        let mut out = result.unwrap_or_default();
        if !self.errors.is_empty() {
            let errors = std::mem::take(&mut self.errors);
            out.set_value("errors", error_list_value(&errors));
        }
        out
    }

    // ── Handshake ─────────────────────────────────────────────────────────────

    /// First handshake step. Idempotent: generates the server nonce once and
    /// returns the same nonce and session id on every subsequent call.
    pub fn connect(&mut self) -> Payload {
        let nonce = self.server_nonce.get_or_insert_with(|| {
            tracing::debug!(session_id = self.session_id, "server nonce issued");
            crypto::generate_nonce()
        });
        let mut out = Payload::new();
        out.set_bytes("server_nonce", nonce.to_vec());
        out.set_long("session_id", self.session_id);
        out
    }

    /// Second handshake step. Verifies the client's signed nonce reply and
    /// returns the node-signed token carrying the session key sealed to the
    /// client's key. Returns `None` on failure with the reason accumulated.
    pub fn issue_token(
        &mut self,
        node_key: &NodeKey,
        data: &[u8],
        signature: &[u8],
    ) -> Option<Payload> {
        if self.client_key.verify(data, signature).is_err() {
            self.add_error(ErrorRecord::new(
                ErrorCode::BadValue,
                "signed_data",
                "signature does not verify",
            ));
            return None;
        }

        let inner = match Payload::unpack(data) {
            Ok(p) => p,
            Err(e) => {
                self.add_error(ErrorRecord::new(
                    ErrorCode::BadValue,
                    "signed_data",
                    e.to_string(),
                ));
                return None;
            }
        };
        let presented = match inner.get_bytes("server_nonce") {
            Ok(b) => b.to_vec(),
            Err(e) => {
                self.add_error(ErrorRecord::new(
                    ErrorCode::BadValue,
                    "server_nonce",
                    e.to_string(),
                ));
                return None;
            }
        };
        let client_nonce = match inner.get_bytes("client_nonce") {
            Ok(b) => b.to_vec(),
            Err(e) => {
                self.add_error(ErrorRecord::new(
                    ErrorCode::BadValue,
                    "client_nonce",
                    e.to_string(),
                ));
                return None;
            }
        };

        match self.server_nonce {
            Some(expected) if expected[..] == presented[..] => {}
            _ => {
                self.add_error(ErrorRecord::new(
                    ErrorCode::BadValue,
                    "server_nonce",
                    "server nonce mismatch",
                ));
                return None;
            }
        }

        if !self.is_keyed() {
            if let Err(record) = self.establish_key() {
                self.add_error(record);
                return None;
            }
        }
        // Some(_) after establish_key succeeded.
        let token = self.encrypted_answer.clone()?;

        let mut outer = Payload::new();
        outer.set_bytes("client_nonce", client_nonce);
        outer.set_bytes("encrypted_token", token);
        let packed = match outer.pack() {
            Ok(b) => b,
            Err(e) => {
                self.add_error(ErrorRecord::new(ErrorCode::Failure, "token", e.to_string()));
                return None;
            }
        };
        let node_signature = node_key.sign(&packed);

        let mut out = Payload::new();
        out.set_bytes("data", packed);
        out.set_bytes("signature", node_signature.to_vec());
        Some(out)
    }

    /// Generate a fresh session key and cache it sealed to the client key.
    /// Repeated `get_token` calls then return byte-identical material.
    fn establish_key(&mut self) -> Result<(), ErrorRecord> {
        let key = SessionKey::generate();

        let mut blob = Payload::new();
        blob.set_bytes("sk", key.as_bytes().to_vec());
        let packed = blob
            .pack()
            .map_err(|e| ErrorRecord::new(ErrorCode::Failure, "token", e.to_string()))?;
        let sealed = self
            .client_key
            .seal(&packed)
            .map_err(|e| ErrorRecord::new(ErrorCode::Failure, "token", e.to_string()))?;

        self.session_key = Some(key);
        self.encrypted_answer = Some(sealed);
        self.key_expired = false;
        tracing::info!(session_id = self.session_id, "session keyed");
        Ok(())
    }

    /// Key rotation hook. Marks the session key stale so that commands fail
    /// until the client completes a fresh `get_token`; the stale material is
    /// retained only to encrypt those failure replies.
    pub fn expire_key(&mut self) {
        if self.session_key.is_some() {
            self.key_expired = true;
            tracing::info!(session_id = self.session_id, "session key expired");
        }
    }
}
