//! API key auth middleware: `X-API-Key` or `Authorization: Bearer …`,
//! constant-time compared against the configured key, with a per-IP
//! brute-force lockout layered the same way the teacher's
//! `require_api_token` is layered (`middleware::from_fn_with_state`).

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::{AppState, AuthMode};

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "unauthorized", "message": message })),
    )
        .into_response()
}

fn extract_key(req: &Request<Body>) -> Option<&str> {
    if let Some(v) = req.headers().get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(v);
    }
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

pub async fn require_api_key(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected_hash = match &state.auth_mode {
        AuthMode::Disabled => return next.run(req).await,
        AuthMode::DenyAll => return unauthorized("API key auth is misconfigured"),
        AuthMode::Key(hash) => hash,
    };

    let ip = addr.ip().to_string();
    if state.auth_lockout.is_locked(&ip) {
        return unauthorized("too many failed attempts, try again later");
    }

    let provided = extract_key(&req).unwrap_or("");
    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        state.auth_lockout.record_failure(&ip);
        return unauthorized("invalid or missing API key");
    }

    state.auth_lockout.record_success(&ip);
    next.run(req).await
}
