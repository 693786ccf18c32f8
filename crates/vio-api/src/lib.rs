//! # vio-api: Violation & Appeal Service
//!
//! Records compliance violations detected on waste-haul trips and runs the
//! appeal workflow through which drivers and contractors contest them.
//! Every read and write is filtered by the caller's role-derived scope.
//!
//! ## API Surface
//!
//! | Prefix                               | Module                   |
//! |--------------------------------------|--------------------------|
//! | `/api/v1/violations/*`               | [`routes::violations`]   |
//! | `/api/v1/appeals/*`                  | [`routes::appeals`]      |
//! | `/api/v1/violations/{id}/appeals`    | [`routes::appeals`]      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! CorsLayer → TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## Unauthenticated endpoints
//!
//! `/health/liveness`, `/health/readiness`, `/healthz`, `/metrics` and
//! `/openapi.json`.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod model;
pub mod openapi;
pub mod routes;
pub mod scope;
pub mod service;
pub mod state;
pub mod store;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        secret: state.config.jwt_access_secret.clone(),
    };

    let api = Router::new()
        .merge(routes::violations::router())
        .merge(routes::appeals::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let public = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .merge(openapi::router());

    Router::new()
        .merge(public)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn liveness() -> &'static str {
    "ok"
}

/// 503 while the store cannot be reached.
async fn readiness(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => "ready".into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "store unavailable").into_response()
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::config::AppConfig;
    use crate::store::memory::MemoryStore;

    fn test_app() -> Router {
        let store = Arc::new(MemoryStore::new());
        app(AppState::new(AppConfig::for_tests("unit-secret"), store))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoints_need_no_token() {
        assert_eq!(get_body(test_app(), "/health/liveness").await, (StatusCode::OK, "ok".into()));
        assert_eq!(get_body(test_app(), "/health/readiness").await, (StatusCode::OK, "ready".into()));

        let (status, body) = get_body(test_app(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn metrics_is_404_without_recorder() {
        let (status, _) = get_body(test_app(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn openapi_is_public() {
        let (status, body) = get_body(test_app(), "/openapi.json").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/api/v1/appeals/{id}/actions"));
    }

    #[tokio::test]
    async fn api_routes_require_a_token() {
        let (status, _) = get_body(test_app(), "/api/v1/violations").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
