use crate::client::{establish, run_command};
use crate::spawn_endpoint;

use ledger_core::codec::Payload;
use ledger_core::crypto::ClientKeypair;
use ledger_core::error::{errors_in, ErrorCode};

#[tokio::test]
async fn sping_answers_spong() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();

    let reply = run_command(&client, session.session_id, &session.key, "sping")
        .await
        .unwrap();
    assert_eq!(
        reply.get_map("result").unwrap().get_str("sping").unwrap(),
        "spong"
    );
    endpoint.shutdown().await;
}

#[tokio::test]
async fn backend_command_is_delegated() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();

    let reply = run_command(&client, session.session_id, &session.key, "backend_status")
        .await
        .unwrap();
    assert_eq!(
        reply.get_map("result").unwrap().get_str("backend").unwrap(),
        "ready"
    );
    endpoint.shutdown().await;
}

#[tokio::test]
async fn unknown_inner_command_is_reported_encrypted() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();

    let reply = run_command(&client, session.session_id, &session.key, "mint_gold")
        .await
        .unwrap();
    let error = reply.get_map("error").unwrap();
    assert_eq!(error.get_str("code").unwrap(), "UNKNOWN_COMMAND");
    assert!(error.get_str("message").unwrap().contains("mint_gold"));
    endpoint.shutdown().await;
}

#[tokio::test]
async fn test_error_command_fails_encrypted() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();

    let reply = run_command(&client, session.session_id, &session.key, "test_error")
        .await
        .unwrap();
    let error = reply.get_map("error").unwrap();
    assert_eq!(error.get_str("code").unwrap(), "COMMAND_FAILED");
    endpoint.shutdown().await;
}

#[tokio::test]
async fn command_with_unknown_session_fails() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();

    let mut params = Payload::new();
    params.set_long("session_id", 12);
    params.set_bytes("params", b"ciphertext".to_vec());
    let reply = client.call("/command", &params).await.unwrap();

    let errors = errors_in(&reply);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, ErrorCode::Failure);
    assert!(errors[0].message.contains("bad session number"));
    endpoint.shutdown().await;
}

#[tokio::test]
async fn rekey_fails_commands_until_new_handshake() {
    let (endpoint, client) = spawn_endpoint().await.unwrap();
    let keys = ClientKeypair::generate();
    let session = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();

    let reply = run_command(&client, session.session_id, &session.key, "hello")
        .await
        .unwrap();
    assert!(reply.contains("result"));

    assert!(endpoint.expire_key_for(&keys.public_bytes()).await);

    // Old key still opens the reply envelope, which now carries the failure.
    let reply = run_command(&client, session.session_id, &session.key, "hello")
        .await
        .unwrap();
    let error = reply.get_map("error").unwrap();
    assert_eq!(error.get_str("code").unwrap(), "COMMAND_FAILED");

    // A fresh handshake on the same session restores service.
    let renewed = establish(&client, &keys, &endpoint.node_public_key())
        .await
        .unwrap();
    assert_eq!(renewed.session_id, session.session_id);
    let reply = run_command(&client, renewed.session_id, &renewed.key, "hello")
        .await
        .unwrap();
    assert!(reply.contains("result"));
    assert_eq!(endpoint.session_count(), 1);
    endpoint.shutdown().await;
}
