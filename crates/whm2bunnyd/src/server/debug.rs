//! Debug routes, mounted only when `WHM2BUNNY_SERVER_DEBUG` is set
//!
//! These dump internal state and re-enqueue failed records; they carry no
//! authentication of their own and must never be exposed publicly.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, info};
use uuid::Uuid;

use whm2bunny_core::state::ProvisionStatus;

use super::AppState;

/// GET /debug/pending: records that are pending or mid-provisioning
pub(super) async fn pending(State(state): State<Arc<AppState>>) -> Response {
    let records = state.state.list_pending().await;
    (StatusCode::OK, Json(records)).into_response()
}

/// GET /debug/last-error: the 10 most recently failed records
pub(super) async fn last_errors(State(state): State<Arc<AppState>>) -> Response {
    let mut failed = state.state.list_failed().await;
    failed.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    failed.truncate(10);
    (StatusCode::OK, Json(failed)).into_response()
}

/// GET /debug/state: all records
pub(super) async fn state_dump(State(state): State<Arc<AppState>>) -> Response {
    let records = state.state.list_all().await;
    (StatusCode::OK, Json(records)).into_response()
}

/// POST /debug/retry/{id}: reset a failed record to pending and re-enqueue
pub(super) async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let record = match state.state.get(&id).await {
        Ok(record) => record,
        Err(err) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "not found", "details": err.to_string() })),
            )
                .into_response();
        }
    };

    if record.status != ProvisionStatus::Failed {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "record is not failed",
                "details": format!("record {id} has status {}", record.status),
            })),
        )
            .into_response();
    }

    if let Err(err) = state.state.mark_pending(&id).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "retry failed", "details": err.to_string() })),
        )
            .into_response();
    }

    let tracking_id = Uuid::new_v4().to_string();
    let provisioner = Arc::clone(&state.provisioner);
    let domain = record.domain.clone();
    info!(id = %id, domain = %domain, tracking_id = %tracking_id, "manual retry requested");

    tokio::spawn(async move {
        if let Err(err) = provisioner.provision(&domain, "").await {
            error!(domain = %domain, error = %err, "manual retry failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "message": "Retry started",
            "id": tracking_id,
        })),
    )
        .into_response()
}
