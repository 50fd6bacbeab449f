//! REST API handlers for clusters and managed units.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use stagegrid_state::{ClusterRecord, ManagedUnit};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

pub(crate) fn internal_error(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_clusters() {
        Ok(clusters) => ApiResponse::ok(clusters).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/clusters/{name}
pub async fn get_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.get_cluster(&name) {
        Ok(Some(cluster)) => ApiResponse::ok(cluster).into_response(),
        Ok(None) => error_response("cluster not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/clusters
pub async fn register_cluster(
    State(state): State<ApiState>,
    Json(cluster): Json<ClusterRecord>,
) -> impl IntoResponse {
    if cluster.name.trim().is_empty() {
        return error_response("cluster name must not be empty", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.store.put_cluster(&cluster) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(cluster)).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/clusters/{name}
pub async fn delete_cluster(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_cluster(&name) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("cluster not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

// ── Units ──────────────────────────────────────────────────────

/// GET /api/v1/units
pub async fn list_units(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_units() {
        Ok(units) => ApiResponse::ok(units).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/units/{namespace}/{name}
pub async fn get_unit(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_unit(&format!("{namespace}/{name}")) {
        Ok(Some(unit)) => ApiResponse::ok(unit).into_response(),
        Ok(None) => error_response("unit not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/units
///
/// Reports the current sync and health of a unit. Emits a unit event.
pub async fn report_unit(
    State(state): State<ApiState>,
    Json(unit): Json<ManagedUnit>,
) -> impl IntoResponse {
    if unit.name.is_empty() || unit.namespace.is_empty() || unit.cluster.is_empty() {
        return error_response(
            "unit name, namespace and cluster are required",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    if unit.name.contains('/') || unit.namespace.contains('/') {
        return error_response("unit name and namespace must not contain '/'", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.store.put_unit(&unit) {
        Ok(()) => ApiResponse::ok(unit).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/units/{namespace}/{name}
pub async fn delete_unit(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.delete_unit(&format!("{namespace}/{name}")) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("unit not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}
