//! # Violation API
//!
//! - `GET  /api/v1/violations`: scoped listing with filters
//! - `POST /api/v1/violations`: manual filing
//! - `GET  /api/v1/violations/{id}`: record, appeals and history
//! - `PUT  /api/v1/violations/{id}/status`: manual status change

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
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
use crate::model::{ViolationDetails, ViolationRecord};
use crate::service::{ManualViolationInput, StatusUpdateInput};
use crate::state::AppState;
use crate::store::ViolationFilter;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/violations",
            get(list_violations).post(create_violation),
        )
        .route("/api/v1/violations/{id}", get(get_violation))
        .route("/api/v1/violations/{id}/status", put(update_violation_status))
}

// -- Request types ------------------------------------------------------------

/// Listing filters. List parameters are comma-separated.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ViolationQuery {
    /// OPEN, CANCELED, FIXED
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub violation_type: Option<String>,
    pub severity: Option<String>,
    pub detected_by: Option<String>,
    pub contractor_id: Option<String>,
    pub driver_id: Option<String>,
    pub ticket_id: Option<String>,
    pub cleaning_area_id: Option<String>,
    /// RFC 3339 or YYYY-MM-DD.
    pub date_from: Option<String>,
    /// RFC 3339 or YYYY-MM-DD (inclusive of the whole day).
    pub date_to: Option<String>,
    /// Driver name or plate number substring.
    pub search: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ViolationQuery {
    fn into_filter(self) -> Result<ViolationFilter, AppError> {
        Ok(ViolationFilter {
            statuses: parse_enum_list(self.status.as_deref())?,
            types: parse_enum_list(self.violation_type.as_deref())?,
            severities: parse_enum_list(self.severity.as_deref())?,
            detected_by: parse_enum_list(self.detected_by.as_deref())?,
            contractor_ids: parse_uuid_list("contractor_id", self.contractor_id.as_deref())?,
            driver_id: parse_optional_uuid("driver_id", self.driver_id.as_deref())?,
            ticket_id: parse_optional_uuid("ticket_id", self.ticket_id.as_deref())?,
            cleaning_area_id: parse_optional_uuid(
                "cleaning_area_id",
                self.cleaning_area_id.as_deref(),
            )?,
            date_from: parse_date("date_from", self.date_from.as_deref(), DayBound::Start)?,
            date_to: parse_date("date_to", self.date_to.as_deref(), DayBound::End)?,
            search: self
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            limit: parse_int(self.limit.as_deref()),
            offset: parse_int(self.offset.as_deref()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateViolationRequest {
    pub trip_id: Uuid,
    /// ROUTE_VIOLATION, FOREIGN_AREA, MISMATCH_PLATE, OVER_CAPACITY,
    /// NO_AREA_WORK, OVER_CONTRACT_LIMIT, SYSTEM
    #[serde(rename = "type")]
    pub violation_type: String,
    /// LPR, VOLUME, GPS, SYSTEM
    pub detected_by: String,
    /// LOW, MEDIUM, HIGH
    pub severity: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateViolationRequest {
    fn into_input(self) -> Result<ManualViolationInput, AppError> {
        Ok(ManualViolationInput {
            trip_id: self.trip_id,
            violation_type: self.violation_type.parse()?,
            detected_by: self.detected_by.parse()?,
            severity: self.severity.parse()?,
            description: self.description,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// CANCELED or FIXED
    pub status: String,
    /// Audit note; when non-blank it also becomes the description.
    #[serde(default)]
    pub description: Option<String>,
}

// -- Handlers -----------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/violations",
    params(ViolationQuery),
    responses(
        (status = 200, description = "Violations visible to the caller, as {data: {items}}", body = Vec<ViolationRecord>),
        (status = 400, description = "Malformed query"),
        (status = 403, description = "Role has no violation scope"),
        (status = 422, description = "Unknown enum value"),
    ),
    tag = "violations"
)]
pub(crate) async fn list_violations(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    query: Result<Query<ViolationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let filter = extract_query(query)?.into_filter()?;
    let records = state.violations.list(&principal, filter).await?;
    Ok(items(records))
}

#[utoipa::path(
    get,
    path = "/api/v1/violations/{id}",
    params(("id" = Uuid, Path, description = "Violation ID")),
    responses(
        (status = 200, description = "Violation details, as {data}", body = ViolationDetails),
        (status = 404, description = "Absent or outside the caller's scope"),
    ),
    tag = "violations"
)]
pub(crate) async fn get_violation(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_path(id)?;
    let details = state.violations.details(&principal, id).await?;
    Ok(data(details))
}

#[utoipa::path(
    post,
    path = "/api/v1/violations",
    request_body = CreateViolationRequest,
    responses(
        (status = 201, description = "Violation filed, as {data}", body = ViolationRecord),
        (status = 403, description = "Role or contractor scope forbids filing"),
        (status = 404, description = "Trip not found"),
        (status = 422, description = "Unknown enum value"),
    ),
    tag = "violations"
)]
pub(crate) async fn create_violation(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    body: Result<Json<CreateViolationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let input = extract_json(body)?.into_input()?;
    let record = state.violations.create_manual(&principal, input).await?;
    Ok((StatusCode::CREATED, data(record)))
}

#[utoipa::path(
    put,
    path = "/api/v1/violations/{id}/status",
    params(("id" = Uuid, Path, description = "Violation ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = super::StatusAck),
        (status = 403, description = "Role cannot change violation status"),
        (status = 404, description = "Absent or outside the caller's scope"),
        (status = 409, description = "Illegal status transition"),
    ),
    tag = "violations"
)]
pub(crate) async fn update_violation_status(
    State(state): State<AppState>,
    CallerIdentity(principal): CallerIdentity,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = extract_path(id)?;
    let req = extract_json(body)?;
    let input = StatusUpdateInput {
        status: req.status.parse()?,
        note: req.description,
    };
    state.violations.update_status(&principal, id, input).await?;
    Ok(ack("updated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vio_core::{DetectedBy, Severity, ViolationType};
    use vio_state::ViolationStatus;

    #[test]
    fn query_maps_to_filter() {
        let query = ViolationQuery {
            status: Some("open,fixed".into()),
            violation_type: Some("over_capacity".into()),
            detected_by: Some("lpr".into()),
            severity: Some("HIGH".into()),
            search: Some("  kaz 123 ".into()),
            limit: Some("x".into()),
            offset: Some("40".into()),
            ..Default::default()
        };
        let filter = query.into_filter().unwrap();
        assert_eq!(
            filter.statuses,
            vec![ViolationStatus::Open, ViolationStatus::Fixed]
        );
        assert_eq!(filter.types, vec![ViolationType::OverCapacity]);
        assert_eq!(filter.detected_by, vec![DetectedBy::PlateMatch]);
        assert_eq!(filter.severities, vec![Severity::High]);
        assert_eq!(filter.search.as_deref(), Some("kaz 123"));
        assert_eq!(filter.limit, None);
        assert_eq!(filter.offset, Some(40));
    }

    #[test]
    fn unknown_type_in_body_is_validation_error() {
        let req = CreateViolationRequest {
            trip_id: Uuid::new_v4(),
            violation_type: "LOITERING".into(),
            detected_by: "GPS".into(),
            severity: "LOW".into(),
            description: None,
        };
        assert!(matches!(req.into_input(), Err(AppError::Validation(_))));
    }
}
