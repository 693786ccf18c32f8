//! # Appeal API
//!
//! - `GET  /api/v1/appeals`: scoped listing with filters
//! - `GET  /api/v1/appeals/{id}`: appeal with conversation and history
//! - `POST /api/v1/violations/{id}/appeals`: file an appeal
//! - `POST /api/v1/appeals/{id}/comments`: post a comment
//! - `POST /api/v1/appeals/{id}/actions`: reviewer action

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    ack, data, items, parse_date, parse_enum_list, parse_int, parse_optional_uuid,
    parse_uuid_list, DayBound,
};
use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_path, extract_query};
use crate::model::{AppealDetail, AppealView};
use crate::service::{AttachmentInput, CommentInput, NewAppealInput, ReviewInput};
use crate::state::AppState;
use crate::store::AppealFilter;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/appeals", get(list_appeals))
        .route("/api/v1/appeals/{id}", get(get_appeal))
        .route("/api/v1/violations/{id}/appeals", post(create_appeal))
        .route("/api/v1/appeals/{id}/comments", post(add_comment))
        .route("/api/v1/appeals/{id}/actions", post(act_on_appeal))
}

// -- Request types ------------------------------------------------------------

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AppealQuery {
    /// SUBMITTED, UNDER_REVIEW, NEED_INFO, APPROVED, REJECTED, CLOSED
    pub status: Option<String>,
    pub reason_code: Option<String>,
    pub violation_type: Option<String>,
    pub contractor_id: Option<String>,
    pub driver_id: Option<String>,
    pub violation_id: Option<String>,
    /// RFC 3339 or YYYY-MM-DD, on the appeal's creation time.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl AppealQuery {
    fn into_filter(self) -> Result<AppealFilter, AppError> {
        Ok(AppealFilter {
            statuses: parse_enum_list(self.status.as_deref())?,
            reason_codes: parse_enum_list(self.reason_code.as_deref())?,
            violation_types: parse_enum_list(self.violation_type.as_deref())?,
            contractor_ids: parse_uuid_list("contractor_id", self.contractor_id.as_deref())?,
            driver_id: parse_optional_uuid("driver_id", self.driver_id.as_deref())?,
            violation_id: parse_optional_uuid("violation_id", self.violation_id.as_deref())?,
            date_from: parse_date("date_from", self.date_from.as_deref(), DayBound::Start)?,
            date_to: parse_date("date_to", self.date_to.as_deref(), DayBound::End)?,
            limit: parse_int(self.limit.as_deref()),
            offset: parse_int(self.offset.as_deref()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachmentPayload {
    pub file_url: String,
    /// IMAGE, VIDEO, DOC
    pub file_type: String,
}

impl From<AttachmentPayload> for AttachmentInput {
    fn from(p: AttachmentPayload) -> Self {
        Self {
            file_url: p.file_url,
            file_type: p.file_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateAppealRequest {
    /// CAMERA_ERROR, TRANSIT_PATH, WRONG_ASSIGNMENT, OTHER
    pub reason_code: String,
    /// At least 10 characters after trimming.
    pub reason_text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CommentRequest {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// UNDER_REVIEW (or START_REVIEW), NEED_INFO (or REQUEST_INFO), APPROVE,
    /// REJECT, CLOSE
    pub action: String,
    /// Required for NEED_INFO. For every action, a non-blank message is
    /// also saved as a reviewer comment on the appeal.
    #[serde(default)]
    pub message: Option<String>,
}

// -- Handlers -----------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/appeals",
    params(AppealQuery),
    responses(
        (status = 200, description = "Appeals visible to the caller, as {data: {items}}", body = Vec<AppealView>),
        (status = 400, description = "Malformed query"),
        (status = 403, description = "Role has no appeal scope"),
        (status = 422, description = "Unknown enum value"),
    ),
    tag = "appeals"
)]
pub(crate) async fn list_appeals(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    query: Result<Query<AppealQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let filter = extract_query(query)?.into_filter()?;
    let appeals = state.appeals.list(&principal, filter).await?;
    Ok(items(appeals))
}

#[utoipa::path(
    get,
    path = "/api/v1/appeals/{id}",
    params(("id" = Uuid, Path, description = "Appeal ID")),
    responses(
        (status = 200, description = "Appeal details, as {data}", body = AppealDetail),
        (status = 404, description = "Absent or outside the caller's scope"),
    ),
    tag = "appeals"
)]
pub(crate) async fn get_appeal(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_path(id)?;
    let detail = state.appeals.get(&principal, id).await?;
    Ok(data(detail))
}

#[utoipa::path(
    post,
    path = "/api/v1/violations/{id}/appeals",
    params(("id" = Uuid, Path, description = "Violation ID")),
    request_body = CreateAppealRequest,
    responses(
        (status = 201, description = "Appeal filed, as {data}", body = AppealDetail),
        (status = 403, description = "Caller is not the trip's driver or contractor"),
        (status = 404, description = "Violation absent or outside the caller's scope"),
        (status = 409, description = "An active appeal already exists"),
        (status = 422, description = "Reason too short, too many attachments or unknown enum value. Checked only after the 403, 404 and 409 conditions"),
    ),
    tag = "appeals"
)]
pub(crate) async fn create_appeal(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CreateAppealRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let violation_id = extract_path(id)?;
    let req = extract_json(body)?;
    let input = NewAppealInput {
        reason_code: req.reason_code,
        reason_text: req.reason_text,
        attachments: req.attachments.into_iter().map(Into::into).collect(),
    };
    let detail = state
        .appeals
        .create(&principal, violation_id, input)
        .await?;
    Ok((StatusCode::CREATED, data(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/appeals/{id}/comments",
    params(("id" = Uuid, Path, description = "Appeal ID")),
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Comment posted", body = super::StatusAck),
        (status = 403, description = "Caller may not comment on this appeal"),
        (status = 404, description = "Absent or outside the caller's scope"),
        (status = 422, description = "Empty message, too many attachments or unknown file type"),
    ),
    tag = "appeals"
)]
pub(crate) async fn add_comment(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let appeal_id = extract_path(id)?;
    let req = extract_json(body)?;
    let input = CommentInput {
        message: req.message,
        attachments: req.attachments.into_iter().map(Into::into).collect(),
    };
    state.appeals.add_comment(&principal, appeal_id, input).await?;
    Ok(ack("commented"))
}

/// Apply a reviewer action to an appeal.
///
/// A non-blank `message` is saved as a reviewer comment for every action,
/// not only NEED_INFO, in the same unit of work as the status change.
#[utoipa::path(
    post,
    path = "/api/v1/appeals/{id}/actions",
    params(("id" = Uuid, Path, description = "Appeal ID")),
    request_body(
        content = ActionRequest,
        description = "Reviewer action. A non-blank message is saved as a reviewer comment for every action; NEED_INFO requires one."
    ),
    responses(
        (status = 200, description = "Action applied", body = super::StatusAck),
        (status = 403, description = "Role cannot review appeals"),
        (status = 404, description = "Absent or outside the caller's scope"),
        (status = 409, description = "Action not allowed from the current status"),
        (status = 422, description = "Unknown action or missing message"),
    ),
    tag = "appeals"
)]
pub(crate) async fn act_on_appeal(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let appeal_id = extract_path(id)?;
    let req = extract_json(body)?;
    let input = ReviewInput {
        action: req.action.parse()?,
        message: req.message,
    };
    state.appeals.act(&principal, appeal_id, input).await?;
    Ok(ack("updated"))
}
