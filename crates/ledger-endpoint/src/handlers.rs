//! HTTP request router — URI dispatch, body-size guard, error shaping.
//!
//! Every request is a multipart form POST with a single `requestData`
//! field carrying the packed params map. Responses are packed maps as
//! `application/octet-stream`; almost everything is `200 OK` with errors
//! encoded in the body. Only the oversized-body rejection is `406`.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use ledger_core::codec::Payload;
use ledger_core::error::{error_list_value, ErrorCode, ErrorRecord};

use crate::command;
use crate::EndpointState;

/// Hard cap on the declared request body size: 2 MiB.
pub const MAX_REQUEST_BYTES: u64 = 2_097_152;

pub(crate) fn router(state: Arc<EndpointState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", post(handle_ping))
        .route("/network", post(handle_network))
        .route("/connect", post(handle_connect))
        .route("/get_token", post(handle_get_token))
        .route("/command", post(handle_command))
        .fallback(handle_unknown)
        // Allowance past the hard cap covers multipart framing overhead;
        // the protocol-level gate below is what clients observe.
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES as usize + 64 * 1024))
        .layer(cors)
        .with_state(state)
}

// ── Request plumbing ──────────────────────────────────────────────────────────

/// Enforce the size gate and pull the packed params map out of the
/// multipart body.
async fn read_params(
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Result<Payload, (StatusCode, ErrorRecord)> {
    if let Some(declared) = declared_length(headers) {
        if declared > MAX_REQUEST_BYTES {
            return Err((
                StatusCode::NOT_ACCEPTABLE,
                ErrorRecord::new(
                    ErrorCode::Failure,
                    "request",
                    format!(
                        "Body too large: {declared}, while maximum allowed is {MAX_REQUEST_BYTES}"
                    ),
                ),
            ));
        }
    }

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err((
                    StatusCode::OK,
                    ErrorRecord::new(ErrorCode::Failure, "requestData", e.to_string()),
                ));
            }
        };
        if field.name() != Some("requestData") {
            continue;
        }
        let bytes = field.bytes().await.map_err(|_| {
            (
                StatusCode::OK,
                ErrorRecord::new(ErrorCode::Failure, "requestData", "tempfile missing"),
            )
        })?;
        return Payload::unpack(&bytes).map_err(|e| {
            (
                StatusCode::OK,
                ErrorRecord::new(ErrorCode::Failure, "requestData", e.to_string()),
            )
        });
    }

    Err((
        StatusCode::OK,
        ErrorRecord::new(ErrorCode::Failure, "requestData", "No requestData"),
    ))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn packed_response(status: StatusCode, payload: &Payload) -> Response {
    match payload.pack() {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn errors_response(status: StatusCode, errors: Vec<ErrorRecord>) -> Response {
    for record in &errors {
        tracing::warn!(error = %record, "request rejected");
    }
    let mut payload = Payload::new();
    payload.set_value("errors", error_list_value(&errors));
    packed_response(status, &payload)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// Unauthenticated liveness: echo the params and add `{ping: "pong"}`.
async fn handle_ping(headers: HeaderMap, multipart: Multipart) -> Response {
    let mut params = match read_params(&headers, multipart).await {
        Ok(p) => p,
        Err((status, record)) => return errors_response(status, vec![record]),
    };
    params.set_str("ping", "pong");
    packed_response(StatusCode::OK, &params)
}

/// The cached network directory.
async fn handle_network(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    if let Err((status, record)) = read_params(&headers, multipart).await {
        return errors_response(status, vec![record]);
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        state.directory.packed(),
    )
        .into_response()
}

/// First handshake step: locate-or-create the session, issue the nonce.
async fn handle_connect(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let params = match read_params(&headers, multipart).await {
        Ok(p) => p,
        Err((status, record)) => return errors_response(status, vec![record]),
    };
    let key_bytes = match params.get_bytes("client_key") {
        Ok(b) => b.to_vec(),
        Err(e) => {
            return errors_response(
                StatusCode::OK,
                vec![ErrorRecord::new(
                    ErrorCode::BadClientKey,
                    "client_key",
                    e.to_string(),
                )],
            );
        }
    };

    match state.registry.get_or_create(&key_bytes).await {
        Ok(session) => {
            let mut session = session.lock().await;
            session.clear_errors();
            let result = session.connect();
            let out = session.answer(Some(result));
            packed_response(StatusCode::OK, &out)
        }
        Err(record) => errors_response(StatusCode::OK, vec![record]),
    }
}

/// Second handshake step: verify the signed nonce reply, deliver the token.
async fn handle_get_token(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let params = match read_params(&headers, multipart).await {
        Ok(p) => p,
        Err((status, record)) => return errors_response(status, vec![record]),
    };
    let session = match lookup_session(&state, &params) {
        Ok(session) => session,
        Err(record) => return errors_response(StatusCode::OK, vec![record]),
    };

    let mut session = session.lock().await;
    session.clear_errors();
    let result = match (params.get_bytes("data"), params.get_bytes("signature")) {
        (Ok(data), Ok(signature)) => session.issue_token(&state.node_key, data, signature),
        (Err(e), _) | (_, Err(e)) => {
            session.add_error(ErrorRecord::new(
                ErrorCode::BadValue,
                "signed_data",
                e.to_string(),
            ));
            None
        }
    };
    let out = session.answer(result);
    packed_response(StatusCode::OK, &out)
}

/// An authenticated command under the session key.
async fn handle_command(
    State(state): State<Arc<EndpointState>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let params = match read_params(&headers, multipart).await {
        Ok(p) => p,
        Err((status, record)) => return errors_response(status, vec![record]),
    };
    let session = match lookup_session(&state, &params) {
        Ok(session) => session,
        Err(record) => return errors_response(StatusCode::OK, vec![record]),
    };

    let mut session = session.lock().await;
    session.clear_errors();
    let result = command::run_command(&mut session, state.backend.as_ref(), &params);
    let out = session.answer(result);
    packed_response(StatusCode::OK, &out)
}

async fn handle_unknown(uri: Uri) -> Response {
    errors_response(
        StatusCode::OK,
        vec![ErrorRecord::new(
            ErrorCode::UnknownCommand,
            "uri",
            format!("command not supported: {}", uri.path()),
        )],
    )
}

fn lookup_session(
    state: &EndpointState,
    params: &Payload,
) -> Result<crate::registry::SharedSession, ErrorRecord> {
    let session_id = params
        .get_long("session_id")
        .map_err(|e| ErrorRecord::new(ErrorCode::Failure, "session_id", e.to_string()))?;
    state
        .registry
        .get_by_id(session_id)
        .ok_or_else(|| ErrorRecord::new(ErrorCode::Failure, "session_id", "bad session number"))
}
