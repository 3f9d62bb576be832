//! The authenticated command envelope: decrypt, dispatch, encrypt.
//!
//! A handful of commands are built in; everything else is delegated to the
//! [`LocalNode`] backend. Both success and failure payloads go back
//! encrypted — no structured command error leaks in cleartext.

use ciborium::value::Value;

use ledger_core::codec::Payload;
use ledger_core::crypto::SessionKey;
use ledger_core::error::{ErrorCode, ErrorRecord};

use crate::session::ClientSession;

/// The application backend that executes real commands once a request is
/// authenticated and decrypted.
pub trait LocalNode: Send + Sync {
    fn execute(&self, command: &str, params: &Payload) -> Result<Value, NodeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("command not supported: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    Failed(String),
}

/// Run one command request against a session.
///
/// `params` is the unpacked outer request; its `params` field holds the
/// ciphertext of the inner command map. Returns the `{result: ciphertext}`
/// payload, or `None` with the failure accumulated on the session when no
/// encrypted reply can be produced at all.
pub fn run_command(
    session: &mut ClientSession,
    backend: &dyn LocalNode,
    params: &Payload,
) -> Option<Payload> {
    let ciphertext = match params.get_bytes("params") {
        Ok(b) => b.to_vec(),
        Err(e) => {
            session.add_error(ErrorRecord::new(ErrorCode::Failure, "params", e.to_string()));
            return None;
        }
    };

    // A session that never completed the handshake has nothing to encrypt
    // a reply under; the failure goes back through the error accumulator.
    let Some(key) = session.session_key().cloned() else {
        session.add_error(ErrorRecord::new(
            ErrorCode::CommandFailed,
            "params",
            "session key is not established",
        ));
        return None;
    };

    let outcome = if session.key_expired() {
        Err(NodeError::Failed(
            "session key has been rotated, repeat the handshake".into(),
        ))
    } else {
        decrypt_and_dispatch(&key, backend, &ciphertext)
    };

    let reply = wrap_outcome(outcome);
    let packed = match reply.pack() {
        Ok(b) => b,
        Err(e) => {
            session.add_error(ErrorRecord::new(ErrorCode::Failure, "result", e.to_string()));
            return None;
        }
    };
    let encrypted = match key.encrypt(&packed) {
        Ok(b) => b,
        Err(e) => {
            session.add_error(ErrorRecord::new(ErrorCode::Failure, "result", e.to_string()));
            return None;
        }
    };

    let mut out = Payload::new();
    out.set_bytes("result", encrypted);
    Some(out)
}

fn decrypt_and_dispatch(
    key: &SessionKey,
    backend: &dyn LocalNode,
    ciphertext: &[u8],
) -> Result<Value, NodeError> {
    let plain = key
        .decrypt(ciphertext)
        .map_err(|e| NodeError::Failed(e.to_string()))?;
    let inner = Payload::unpack(&plain).map_err(|e| NodeError::Failed(e.to_string()))?;
    let command = inner
        .get_str("command")
        .map_err(|e| NodeError::Failed(e.to_string()))?
        .to_string();
    tracing::debug!(command = %command, "dispatching command");
    dispatch(backend, &command, &inner)
}

/// Built-in dispatch table; anything unlisted goes to the backend.
pub fn dispatch(
    backend: &dyn LocalNode,
    command: &str,
    params: &Payload,
) -> Result<Value, NodeError> {
    match command {
        "hello" => {
            let mut result = Payload::new();
            result.set_str("status", "OK");
            result.set_str("message", "welcome to the Universa");
            Ok(result.into_value())
        }
        "sping" => {
            let mut result = Payload::new();
            result.set_str("sping", "spong");
            Ok(result.into_value())
        }
        "test_error" => Err(NodeError::Failed("test_error command was called".into())),
        other => backend.execute(other, params),
    }
}

fn wrap_outcome(outcome: Result<Value, NodeError>) -> Payload {
    let mut reply = Payload::new();
    match outcome {
        Ok(value) => reply.set_value("result", value),
        Err(e) => {
            let record = match e {
                NodeError::UnknownCommand(command) => ErrorRecord::new(
                    ErrorCode::UnknownCommand,
                    "command",
                    format!("command not supported: {command}"),
                ),
                NodeError::Failed(message) => {
                    ErrorRecord::new(ErrorCode::CommandFailed, "command", message)
                }
            };
            tracing::warn!(error = %record, "command failed");
            reply.set_value("error", record.to_payload().into_value());
        }
    }
    reply
}
