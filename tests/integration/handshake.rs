use crate::client::{establish, TestClient};
use crate::spawn_endpoint;

use anyhow::Result;
use ledger_core::codec::Payload;
use ledger_core::crypto::ClientKeypair;
use ledger_core::error::{errors_in, ErrorCode};

async fn connect(client: &TestClient, keys: &ClientKeypair) -> Result<Payload> {
    let mut params = Payload::new();
    params.set_bytes("client_key", keys.public_bytes().to_vec());
    client.call("/connect", &params).await
}

#[tokio::test]
async fn repeated_connect_returns_same_nonce_and_id() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();

    let a = connect(&client, &keys).await.unwrap();
    let b = connect(&client, &keys).await.unwrap();

    assert_eq!(a.get_bytes("server_nonce").unwrap().len(), 48);
    assert_eq!(
        a.get_bytes("server_nonce").unwrap(),
        b.get_bytes("server_nonce").unwrap()
    );
    assert_eq!(
        a.get_long("session_id").unwrap(),
        b.get_long("session_id").unwrap()
    );
    assert_eq!(endpoint.session_count(), 1);
    endpoint.shutdown().await;
}

#[tokio::test]
async fn concurrent_connects_create_one_session() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let key_bytes = keys.public_bytes().to_vec();
        handles.push(tokio::spawn(async move {
            let mut params = Payload::new();
            params.set_bytes("client_key", key_bytes);
            client.call("/connect", &params).await.unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().get_long("session_id").unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all connects must share one session");
    assert_eq!(endpoint.session_count(), 1);
    endpoint.shutdown().await;
}

#[tokio::test]
async fn malformed_client_key_is_rejected() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();

    let mut params = Payload::new();
    params.set_bytes("client_key", b"way too short".to_vec());
    let reply = client.call("/connect", &params).await.unwrap();

    let errors = errors_in(&reply);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::BadClientKey);
    assert_eq!(errors[0].object, "client_key");
    assert_eq!(endpoint.session_count(), 0);
    endpoint.shutdown().await;
}

#[tokio::test]
async fn full_handshake_yields_working_session_key() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();

    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();
    let reply = crate::client::run_command(&client, session.session_id, &session.key, "hello")
        .await
        .unwrap();

    let result = reply.get_map("result").unwrap();
    assert_eq!(result.get_str("status").unwrap(), "OK");
    assert_eq!(result.get_str("message").unwrap(), "welcome to the Universa");
    endpoint.shutdown().await;
}

#[tokio::test]
async fn wrong_server_nonce_withholds_token() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();

    let reply = connect(&client, &keys).await.unwrap();
    let session_id = reply.get_long("session_id").unwrap();

    // Correctly signed, but over somebody else's nonce.
    let mut inner = Payload::new();
    inner.set_bytes("server_nonce", vec![0u8; 48]);
    inner.set_bytes("client_nonce", b"challenge".to_vec());
    let data = inner.pack().unwrap();
    let signature = keys.sign(&data).to_vec();

    let mut params = Payload::new();
    params.set_long("session_id", session_id);
    params.set_bytes("data", data);
    params.set_bytes("signature", signature);
    let reply = client.call("/get_token", &params).await.unwrap();

    assert!(!reply.contains("data"), "no token on nonce mismatch");
    let errors = errors_in(&reply);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::BadValue);
    assert_eq!(errors[0].object, "server_nonce");
    endpoint.shutdown().await;
}

#[tokio::test]
async fn invalid_signature_withholds_token() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let stranger = ClientKeypair::generate();

    let reply = connect(&client, &keys).await.unwrap();
    let session_id = reply.get_long("session_id").unwrap();
    let server_nonce = reply.get_bytes("server_nonce").unwrap().to_vec();

    let mut inner = Payload::new();
    inner.set_bytes("server_nonce", server_nonce);
    inner.set_bytes("client_nonce", b"challenge".to_vec());
    let data = inner.pack().unwrap();
    let forged = stranger.sign(&data).to_vec();

    let mut params = Payload::new();
    params.set_long("session_id", session_id);
    params.set_bytes("data", data);
    params.set_bytes("signature", forged);
    let reply = client.call("/get_token", &params).await.unwrap();

    assert!(!reply.contains("data"));
    let errors = errors_in(&reply);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::BadValue);
    assert_eq!(errors[0].object, "signed_data");
    endpoint.shutdown().await;
}

#[tokio::test]
async fn repeated_get_token_returns_identical_material() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();

    let reply = connect(&client, &keys).await.unwrap();
    let session_id = reply.get_long("session_id").unwrap();
    let server_nonce = reply.get_bytes("server_nonce").unwrap().to_vec();

    let mut inner = Payload::new();
    inner.set_bytes("server_nonce", server_nonce);
    inner.set_bytes("client_nonce", b"challenge".to_vec());
    let data = inner.pack().unwrap();
    let signature = keys.sign(&data).to_vec();

    let mut params = Payload::new();
    params.set_long("session_id", session_id);
    params.set_bytes("data", data);
    params.set_bytes("signature", signature);

    let a = client.call("/get_token", &params).await.unwrap();
    let b = client.call("/get_token", &params).await.unwrap();
    assert_eq!(a.get_bytes("data").unwrap(), b.get_bytes("data").unwrap());
    assert_eq!(
        a.get_bytes("signature").unwrap(),
        b.get_bytes("signature").unwrap()
    );
    endpoint.shutdown().await;
}

#[tokio::test]
async fn get_token_with_unknown_session_fails() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();

    let mut params = Payload::new();
    params.set_long("session_id", 12);
    params.set_bytes("data", b"x".to_vec());
    params.set_bytes("signature", b"y".to_vec());
    let reply = client.call("/get_token", &params).await.unwrap();

    let errors = errors_in(&reply);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::Failure);
    assert!(errors[0].message.contains("bad session number"));
    endpoint.shutdown().await;
}
