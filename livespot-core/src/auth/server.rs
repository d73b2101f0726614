//! Loopback HTTP view of the broker's state for the supervisor/dashboard.
//!
//! `GET /auth`, `GET /health`, `POST /refresh`; anything else is a JSON 404.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_server::{Handle, Server};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::broker::CredentialBroker;
use crate::retry::RetryTracker;
use crate::Error;

#[derive(Clone)]
pub struct AuthServerState {
    pub broker: Arc<CredentialBroker>,
    pub retry: RetryTracker,
}

pub struct AuthServerHandle {
    handle: Handle,
    pub addr: SocketAddr,
}

impl AuthServerHandle {
    pub fn shutdown(&self) {
        self.handle.graceful_shutdown(None);
    }
}

pub fn build_router(state: AuthServerState) -> Router {
    Router::new()
        .route("/auth", get(handle_auth))
        .route("/health", get(handle_health))
        .route("/refresh", post(handle_refresh))
        .fallback(handle_not_found)
        .method_not_allowed_fallback(handle_not_found)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn start_auth_server(state: AuthServerState, port: u16) -> Result<AuthServerHandle, Error> {
    let app = build_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("[AuthServer] listening on http://{}", addr);

    let handle = Handle::new();
    let server = Server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service());

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("[AuthServer] server error: {}", e);
        }
        info!("[AuthServer] shut down.");
    });

    Ok(AuthServerHandle { handle, addr })
}

async fn handle_auth(State(state): State<AuthServerState>) -> (StatusCode, Json<Value>) {
    let now = Utc::now();
    match state.broker.snapshot().filter(|c| !c.is_empty() && c.expires_at > now.timestamp()) {
        Some(c) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "jwt": c.jwt,
                "cfClearance": c.cf_clearance,
                "wsUrl": c.ws_url,
                "userId": c.user_id,
                "expiresAt": c.expires_at,
                "method": c.method,
                "remainingSeconds": c.remaining_seconds(now),
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ok": false, "error": "no valid credential" })),
        ),
    }
}

async fn handle_health(State(state): State<AuthServerState>) -> Json<Value> {
    let now = Utc::now();
    let snapshot = state.broker.snapshot();
    let remaining = snapshot.as_ref().map(|c| c.remaining_seconds(now)).unwrap_or(0);
    let healthy = snapshot.as_ref().map(|c| !c.is_empty()).unwrap_or(false) && remaining > 0;
    Json(json!({
        "ok": healthy,
        "status": if healthy { "healthy" } else { "expired" },
        "remainingSeconds": remaining,
        "refreshCount": state.broker.refresh_count(),
        "acquiredAt": snapshot.as_ref().map(|c| c.acquired_at.to_rfc3339()),
        "method": snapshot.as_ref().and_then(|c| c.method),
    }))
}

async fn handle_refresh(State(state): State<AuthServerState>) -> (StatusCode, Json<Value>) {
    info!("[AuthServer] forced refresh requested");
    let cred = state.broker.force_refresh(None).await;
    if cred.is_empty() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": "all credential sources failed" })),
        );
    }
    state.retry.reset_by_prefix("stream:");
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "message": "credential refreshed",
            "remainingSeconds": cred.remaining_seconds(Utc::now()),
            "method": cred.method,
        })),
    )
}

async fn handle_not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "not found" })))
}
