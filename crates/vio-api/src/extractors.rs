//! # Extraction Helpers
//!
//! Handlers take axum extractors as `Result<_, Rejection>` and pass them
//! through these helpers so that malformed bodies, paths and query strings
//! all surface as [`AppError::BadRequest`] with the standard error body.
//!
//! ```ignore
//! async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
//!     let req = extract_json(body)?;
//! }
//! ```

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;

use crate::error::AppError;

pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_path<T>(result: Result<Path<T>, PathRejection>) -> Result<T, AppError> {
    result
        .map(|Path(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

pub fn extract_query<T>(result: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    result
        .map(|Query(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[derive(Deserialize)]
    struct Payload {
        message: String,
    }

    fn app() -> Router {
        Router::new().route(
            "/items/{id}",
            post(
                |path: Result<Path<Uuid>, PathRejection>,
                 body: Result<Json<Payload>, JsonRejection>| async move {
                    let id = match extract_path(path) {
                        Ok(id) => id,
                        Err(e) => return e.into_response(),
                    };
                    match extract_json(body) {
                        Ok(b) => format!("{id}:{}", b.message).into_response(),
                        Err(e) => e.into_response(),
                    }
                },
            ),
        )
    }

    async fn status(uri: &str, body: &str) -> StatusCode {
        app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn well_formed_request_passes() {
        let uri = format!("/items/{}", Uuid::new_v4());
        assert_eq!(status(&uri, r#"{"message":"hi"}"#).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_path_is_bad_request() {
        assert_eq!(
            status("/items/not-a-uuid", r#"{"message":"hi"}"#).await,
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let uri = format!("/items/{}", Uuid::new_v4());
        assert_eq!(status(&uri, "{not json").await, StatusCode::BAD_REQUEST);
        assert_eq!(status(&uri, r#"{"other":1}"#).await, StatusCode::BAD_REQUEST);
    }
}
