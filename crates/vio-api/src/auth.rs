//! # Authentication Middleware
//!
//! Validates HS256 bearer tokens issued by the identity provider and injects
//! the caller's [`Principal`] into the request extensions.
//!
//! ## Token Claims
//!
//! ```text
//! sid        session id
//! sub        user id
//! org_id     organization of the user
//! role       AKIMAT_ADMIN | KGU_ZKH_ADMIN | LANDFILL_ADMIN | LANDFILL_USER
//!            | CONTRACTOR_ADMIN | DRIVER
//! driver_id  drivers only, optional
//! exp        expiry, unix seconds
//! ```
//!
//! A missing, malformed, badly signed or expired token is rejected with 401.
//! A valid token naming an unknown role is rejected with 403.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vio_core::{Principal, Role};

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// JWT claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sid: Uuid,
    pub sub: Uuid,
    pub org_id: Uuid,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<Uuid>,
    pub exp: u64,
}

/// Identity of the authenticated caller, available to handlers via
/// `FromRequestParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub Principal);

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CallerIdentity)
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the secret.
#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
enum TokenRejection {
    Invalid(String),
    UnknownRole(String),
}

/// Decode and verify `token`, then map its claims to a [`Principal`].
fn principal_from_token(token: &str, secret: &str) -> Result<Principal, TokenRejection> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| TokenRejection::Invalid(e.to_string()))?;

    let claims = data.claims;
    let role: Role = claims
        .role
        .parse()
        .map_err(|_| TokenRejection::UnknownRole(claims.role.clone()))?;

    Ok(Principal {
        user_id: claims.sub,
        org_id: claims.org_id,
        role,
        driver_id: claims.driver_id,
    })
}

/// Split `Bearer <token>`; the scheme is matched case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(config) = request.extensions().get::<AuthConfig>().cloned() else {
        tracing::error!("auth middleware installed without AuthConfig");
        return AppError::Internal("authentication is not configured".into()).into_response();
    };

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(header_value) = header_value else {
        tracing::warn!("authentication failed: missing authorization header");
        return unauthorized_response("missing authorization header");
    };
    let Some(token) = bearer_token(header_value) else {
        tracing::warn!("authentication failed: non-Bearer authorization scheme");
        return unauthorized_response("authorization header must use Bearer scheme");
    };

    match principal_from_token(token, &config.secret) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(TokenRejection::Invalid(reason)) => {
            tracing::warn!(reason = %reason, "authentication failed: invalid bearer token");
            unauthorized_response("invalid bearer token")
        }
        Err(TokenRejection::UnknownRole(role)) => {
            tracing::warn!(role = %role, "authorization failed: unknown role");
            AppError::Forbidden(format!("role {role} is not allowed")).into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn test_app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|CallerIdentity(p): CallerIdentity| async move { p.role.to_string() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig {
                secret: SECRET.to_string(),
            }))
    }

    fn token(role: &str, secret: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sid: Uuid::new_v4(),
            sub: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            role: role.to_string(),
            driver_id: None,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn call(auth: Option<String>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = test_app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_injects_principal() {
        let (status, body) = call(Some(format!("Bearer {}", token("DRIVER", SECRET, 600)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "DRIVER");
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        let (status, _) = call(Some(format!("bearer {}", token("AKIMAT_ADMIN", SECRET, 600)))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (status, body) = call(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_signature_is_unauthorized() {
        let (status, _) = call(Some(format!("Bearer {}", token("DRIVER", "other", 600)))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_unauthorized() {
        let (status, _) = call(Some(format!("Bearer {}", token("DRIVER", SECRET, -3600)))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn basic_scheme_is_unauthorized() {
        let (status, body) = call(Some("Basic dXNlcjpwYXNz".into())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn unknown_role_is_forbidden() {
        let (status, body) = call(Some(format!("Bearer {}", token("JANITOR", SECRET, 600)))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "FORBIDDEN");
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Token abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn auth_config_debug_redacts_secret() {
        let config = AuthConfig {
            secret: "super-secret".into(),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
