//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Violation & Appeal Service",
        version = "0.1.0",
        description = "Compliance violations detected on waste-haul trips and the appeal workflow through which drivers and contractors contest them."
    ),
    paths(
        crate::routes::violations::list_violations,
        crate::routes::violations::get_violation,
        crate::routes::violations::create_violation,
        crate::routes::violations::update_violation_status,
        crate::routes::appeals::list_appeals,
        crate::routes::appeals::get_appeal,
        crate::routes::appeals::create_appeal,
        crate::routes::appeals::add_comment,
        crate::routes::appeals::act_on_appeal,
    ),
    components(schemas(
        crate::model::Violation,
        crate::model::ViolationRecord,
        crate::model::ViolationDetails,
        crate::model::ViolationStatusLog,
        crate::model::Appeal,
        crate::model::AppealView,
        crate::model::AppealDetail,
        crate::model::AppealComment,
        crate::model::AppealAttachment,
        crate::model::AppealStatusLog,
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::StatusAck,
        crate::routes::violations::CreateViolationRequest,
        crate::routes::violations::UpdateStatusRequest,
        crate::routes::appeals::CreateAppealRequest,
        crate::routes::appeals::CommentRequest,
        crate::routes::appeals::ActionRequest,
        crate::routes::appeals::AttachmentPayload,
    )),
    modifiers(&BearerAuth),
    security(("bearer" = [])),
    tags(
        (name = "violations", description = "Scoped violation listing and manual management"),
        (name = "appeals", description = "Appeal filing, conversation and review"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_lists_every_route() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&String> = spec.paths.paths.keys().collect();
        for expected in [
            "/api/v1/violations",
            "/api/v1/violations/{id}",
            "/api/v1/violations/{id}/status",
            "/api/v1/violations/{id}/appeals",
            "/api/v1/appeals",
            "/api/v1/appeals/{id}",
            "/api/v1/appeals/{id}/comments",
            "/api/v1/appeals/{id}/actions",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }

    #[test]
    fn review_action_documents_message_as_comment() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains(
            "A non-blank message is saved as a reviewer comment for every action"
        ));
    }

    #[test]
    fn spec_declares_bearer_security() {
        let spec = ApiDoc::openapi();
        let components = spec.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
