//! Webhook, health, readiness and liveness handlers

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info, warn};
use uuid::Uuid;

use whm2bunny_core::webhook::{
    verify_signature, WebhookPayload, EVENT_ACCOUNT_CREATED, EVENT_ACCOUNT_DELETED,
    EVENT_ADDON_CREATED, EVENT_SUBDOMAIN_CREATED, SIGNATURE_HEADER,
};

use super::AppState;

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "details": details,
        })),
    )
        .into_response()
}

/// POST /hook
///
/// Verifies the HMAC signature over the exact received bytes, validates the
/// payload, spawns the matching pipeline task and acknowledges with 202
/// before any provisioning work runs.
pub(super) async fn hook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&state.secret, &body, signature) {
        warn!("webhook rejected: invalid signature");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            Some("invalid signature".to_string()),
        );
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "webhook rejected: malformed payload");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid payload",
                Some(err.to_string()),
            );
        }
    };

    if let Err(err) = state.validator.validate_payload(&payload).await {
        warn!(event = %payload.event, error = %err, "webhook rejected: validation failed");
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation failed",
            Some(err.to_string()),
        );
    }

    let tracking_id = Uuid::new_v4().to_string();
    let provisioner = Arc::clone(&state.provisioner);
    let event = payload.event.clone();

    match event.as_str() {
        EVENT_ACCOUNT_CREATED | EVENT_ADDON_CREATED => {
            let id = tracking_id.clone();
            tokio::spawn(async move {
                if let Err(err) = provisioner.provision(&payload.domain, &payload.user).await {
                    error!(tracking_id = %id, domain = %payload.domain, error = %err, "provisioning failed");
                }
            });
        }
        EVENT_SUBDOMAIN_CREATED => {
            let id = tracking_id.clone();
            tokio::spawn(async move {
                if let Err(err) = provisioner
                    .provision_subdomain(&payload.subdomain, &payload.parent_domain, &payload.user)
                    .await
                {
                    error!(tracking_id = %id, subdomain = %payload.subdomain, error = %err, "subdomain provisioning failed");
                }
            });
        }
        EVENT_ACCOUNT_DELETED => {
            let id = tracking_id.clone();
            tokio::spawn(async move {
                if let Err(err) = provisioner.deprovision(&payload.domain).await {
                    error!(tracking_id = %id, domain = %payload.domain, error = %err, "deprovisioning failed");
                }
            });
        }
        other => {
            warn!(event = other, "webhook rejected: unknown event");
            return error_response(
                StatusCode::BAD_REQUEST,
                "unknown event",
                Some(format!("event type '{other}' is not supported")),
            );
        }
    }

    info!(tracking_id = %tracking_id, event = %event, "webhook accepted");

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Processing started",
            "id": tracking_id,
        })),
    )
        .into_response()
}

/// GET /health
pub(super) async fn health(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "uptime": state.started_at.elapsed().as_secs(),
            "version": state.version,
        })),
    )
        .into_response()
}

/// GET /ready
pub(super) async fn ready(State(state): State<Arc<AppState>>) -> Response {
    let (provider, notifier, store) = state.checks.snapshot();
    let ready = provider && notifier && store;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "checks": {
                "provider": provider,
                "notifier": notifier,
                "state": store,
            },
        })),
    )
        .into_response()
}

/// GET /ping
pub(super) async fn ping() -> Response {
    (StatusCode::OK, "pong").into_response()
}
