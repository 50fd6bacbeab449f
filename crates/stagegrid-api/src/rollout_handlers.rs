//! REST API handlers for rollout management.
//!
//! Rollouts are validated on submission: every selector must parse and
//! every quota field must be an integer or a percentage. The controller
//! re-checks both on each pass, since the registry can change underneath.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::info;

use stagegrid_rollout::quota;
use stagegrid_rollout::Selector;
use stagegrid_state::{Rollout, RolloutKey};

use crate::handlers::{error_response, internal_error, ApiResponse};
use crate::ApiState;

/// Check a submitted rollout for syntax errors.
pub fn validate_rollout(rollout: &Rollout) -> Result<(), String> {
    for (field, value) in [("namespace", &rollout.namespace), ("name", &rollout.name)] {
        if value.is_empty() || value.contains('/') {
            return Err(format!("rollout {field} must be non-empty and must not contain '/'"));
        }
    }
    let source = &rollout.spec.source_ref;
    if source.kind.is_empty() || source.name.is_empty() {
        return Err("source_ref kind and name are required".to_string());
    }

    let mut seen = std::collections::HashSet::new();
    for stage in &rollout.spec.stages {
        if stage.name.is_empty() {
            return Err("stage name must not be empty".to_string());
        }
        if !seen.insert(stage.name.as_str()) {
            return Err(format!("duplicate stage name `{}`", stage.name));
        }
        Selector::parse(&stage.clusters).map_err(|e| format!("stage {}: {e}", stage.name))?;
        if let Some(requeue) = &stage.requeue {
            Selector::parse(requeue).map_err(|e| format!("stage {}: {e}", stage.name))?;
        }
        quota::validate(stage).map_err(|e| format!("stage {}: {e}", stage.name))?;
    }
    Ok(())
}

/// GET /api/v1/rollouts
pub async fn list_rollouts(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_rollouts() {
        Ok(rollouts) => ApiResponse::ok(rollouts).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/v1/rollouts
///
/// Creates or replaces a rollout. Emits a rollout event.
pub async fn apply_rollout(
    State(state): State<ApiState>,
    Json(rollout): Json<Rollout>,
) -> impl IntoResponse {
    if let Err(msg) = validate_rollout(&rollout) {
        return error_response(&msg, StatusCode::BAD_REQUEST).into_response();
    }
    match state.store.put_rollout(&rollout) {
        Ok(()) => {
            info!(rollout = %rollout.key(), stages = rollout.spec.stages.len(), "rollout applied");
            (StatusCode::CREATED, ApiResponse::ok(rollout)).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/rollouts/{namespace}/{name}
pub async fn get_rollout(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_rollout(&RolloutKey::new(&namespace, &name)) {
        Ok(Some(rollout)) => ApiResponse::ok(rollout).into_response(),
        Ok(None) => error_response("rollout not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// DELETE /api/v1/rollouts/{namespace}/{name}
pub async fn delete_rollout(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    let key = RolloutKey::new(&namespace, &name);
    match state.store.delete_rollout(&key) {
        Ok(true) => {
            info!(rollout = %key, "rollout deleted");
            ApiResponse::ok("deleted").into_response()
        }
        Ok(false) => error_response("rollout not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/v1/rollouts/{namespace}/{name}/status
pub async fn get_rollout_status(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state
        .store
        .get_rollout_status(&RolloutKey::new(&namespace, &name))
    {
        Ok(Some(status)) => ApiResponse::ok(status).into_response(),
        Ok(None) => {
            error_response("no status recorded for rollout", StatusCode::NOT_FOUND).into_response()
        }
        Err(e) => internal_error(e),
    }
}
