//! A minimal protocol client for driving the endpoint in tests.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use ledger_core::codec::Payload;
use ledger_core::crypto::{self, ClientKeypair, SessionKey};

#[derive(Clone)]
pub struct TestClient {
    http: reqwest::Client,
    base: String,
}

impl TestClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{addr}"),
        }
    }

    /// POST raw bytes as the `requestData` form field.
    pub async fn post_raw(&self, path: &str, body: Vec<u8>) -> Result<(StatusCode, Vec<u8>)> {
        let form = Form::new().part("requestData", Part::bytes(body));
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        let status = response.status();
        let bytes = response.bytes().await?;
        Ok((status, bytes.to_vec()))
    }

    /// POST a params map, unpack the response map.
    pub async fn post(&self, path: &str, params: &Payload) -> Result<(StatusCode, Payload)> {
        let (status, body) = self.post_raw(path, params.pack()?).await?;
        Ok((status, Payload::unpack(&body)?))
    }

    /// POST a params map, expecting `200 OK`.
    pub async fn call(&self, path: &str, params: &Payload) -> Result<Payload> {
        let (status, payload) = self.post(path, params).await?;
        if status != StatusCode::OK {
            bail!("{path}: unexpected status {status}");
        }
        Ok(payload)
    }
}

/// A completed handshake: the routing handle plus the delivered key.
pub struct Established {
    pub session_id: i64,
    pub key: SessionKey,
}

/// Run the full two-step handshake against the endpoint, verifying the
/// node's signature and the echoed client nonce along the way.
pub async fn establish(
    client: &TestClient,
    keys: &ClientKeypair,
    node_public: &[u8; 32],
) -> Result<Established> {
    let mut params = Payload::new();
    params.set_bytes("client_key", keys.public_bytes().to_vec());
    let reply = client.call("/connect", &params).await?;
    let server_nonce = reply.get_bytes("server_nonce")?.to_vec();
    let session_id = reply.get_long("session_id")?;

    let client_nonce = b"integration-client-nonce".to_vec();
    let mut inner = Payload::new();
    inner.set_bytes("server_nonce", server_nonce);
    inner.set_bytes("client_nonce", client_nonce.clone());
    let data = inner.pack()?;
    let signature = keys.sign(&data).to_vec();

    let mut params = Payload::new();
    params.set_long("session_id", session_id);
    params.set_bytes("data", data);
    params.set_bytes("signature", signature);
    let reply = client.call("/get_token", &params).await?;

    let signed = reply.get_bytes("data")?;
    let node_signature = reply.get_bytes("signature")?;
    crypto::verify_signature(node_public, signed, node_signature)?;

    let outer = Payload::unpack(signed)?;
    if outer.get_bytes("client_nonce")? != client_nonce.as_slice() {
        bail!("client nonce was not echoed");
    }
    let blob = keys.open(outer.get_bytes("encrypted_token")?)?;
    let key = SessionKey::from_bytes(Payload::unpack(&blob)?.get_bytes("sk")?)?;

    Ok(Established { session_id, key })
}

/// Send one encrypted command and decrypt the reply envelope.
pub async fn run_command(
    client: &TestClient,
    session_id: i64,
    key: &SessionKey,
    command: &str,
) -> Result<Payload> {
    let mut inner = Payload::new();
    inner.set_str("command", command);
    let ciphertext = key.encrypt(&inner.pack()?)?;

    let mut params = Payload::new();
    params.set_long("session_id", session_id);
    params.set_bytes("params", ciphertext);
    let reply = client.call("/command", &params).await?;

    let plain = key.decrypt(reply.get_bytes("result")?)?;
    Ok(Payload::unpack(&plain)?)
}
