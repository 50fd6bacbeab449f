//! stagegrid-api: REST API for Stagegrid.
//!
//! Clusters register themselves with labels, agents report the sync and
//! health of the units they run, and operators apply rollouts. Every unit
//! or rollout write publishes a store event that the controller picks up.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/clusters` | List clusters |
//! | POST | `/api/v1/clusters` | Register or update a cluster |
//! | GET | `/api/v1/clusters/{name}` | Get a cluster |
//! | DELETE | `/api/v1/clusters/{name}` | Remove a cluster |
//! | GET | `/api/v1/units` | List managed units |
//! | POST | `/api/v1/units` | Report a unit's sync/health |
//! | GET | `/api/v1/units/{namespace}/{name}` | Get a unit |
//! | DELETE | `/api/v1/units/{namespace}/{name}` | Remove a unit |
//! | GET | `/api/v1/rollouts` | List rollouts |
//! | POST | `/api/v1/rollouts` | Create or replace a rollout |
//! | GET | `/api/v1/rollouts/{namespace}/{name}` | Get a rollout |
//! | DELETE | `/api/v1/rollouts/{namespace}/{name}` | Delete a rollout |
//! | GET | `/api/v1/rollouts/{namespace}/{name}/status` | Last pass result |

pub mod handlers;
pub mod rollout_handlers;

use axum::Router;
use axum::routing::get;
use stagegrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
}

/// Build the complete API router.
pub fn build_router(store: StateStore) -> Router {
    let api_state = ApiState { store };

    let api_routes = Router::new()
        .route("/clusters", get(handlers::list_clusters).post(handlers::register_cluster))
        .route("/clusters/{name}", get(handlers::get_cluster).delete(handlers::delete_cluster))
        .route("/units", get(handlers::list_units).post(handlers::report_unit))
        .route(
            "/units/{namespace}/{name}",
            get(handlers::get_unit).delete(handlers::delete_unit),
        )
        .route(
            "/rollouts",
            get(rollout_handlers::list_rollouts).post(rollout_handlers::apply_rollout),
        )
        .route(
            "/rollouts/{namespace}/{name}",
            get(rollout_handlers::get_rollout).delete(rollout_handlers::delete_rollout),
        )
        .route(
            "/rollouts/{namespace}/{name}/status",
            get(rollout_handlers::get_rollout_status),
        )
        .with_state(api_state);

    Router::new().nest("/api/v1", api_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn envelope_on_success() {
        let router = build_router(StateStore::open_in_memory().unwrap());
        let req = Request::builder()
            .uri("/api/v1/clusters")
            .body(Body::empty())
            .unwrap();

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!([]));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn envelope_on_error() {
        let router = build_router(StateStore::open_in_memory().unwrap());
        let req = Request::builder()
            .uri("/api/v1/rollouts/argocd/missing")
            .body(Body::empty())
            .unwrap();

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "rollout not found");
    }

    #[tokio::test]
    async fn post_rollout_with_bad_quota_is_400() {
        let router = build_router(StateStore::open_in_memory().unwrap());
        let rollout = serde_json::json!({
            "namespace": "argocd",
            "name": "web",
            "spec": {
                "source_ref": {"api_group": "argoproj.io/v1alpha1", "kind": "ApplicationSet", "name": "web"},
                "stages": [{
                    "name": "all",
                    "clusters": "",
                    "max_clusters": "ten percent",
                    "max_unavailable": 1
                }]
            }
        });
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/rollouts")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&rollout).unwrap()))
            .unwrap();

        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("max_clusters"));
    }

    #[tokio::test]
    async fn report_unit_then_fetch_by_namespace_and_name() {
        let router = build_router(StateStore::open_in_memory().unwrap());
        let unit = serde_json::json!({
            "name": "web-eu-1",
            "namespace": "argocd",
            "cluster": "eu-1",
            "sync": "OutOfSync",
            "health": "Healthy"
        });
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/units")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&unit).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/api/v1/units/argocd/web-eu-1")
            .body(Body::empty())
            .unwrap();
        let resp = router.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["cluster"], "eu-1");
    }
}
