//! # API Route Modules
//!
//! - `violations`: scoped violation listing and details, manual filing,
//!   manual status changes.
//! - `appeals`: appeal filing, listing, conversation and review actions.
//!
//! All routes live under `/api/v1` and require a bearer token. Success
//! bodies are wrapped as `{"data": ...}`; listings as
//! `{"data": {"items": [...]}}`.

pub mod appeals;
pub mod violations;

use std::str::FromStr;

use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vio_core::CoreError;

use crate::error::AppError;

/// Success envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

/// Acknowledgement body for writes that return no resource.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusAck {
    /// `updated` or `commented`.
    pub status: String,
}

pub(crate) fn data<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data })
}

pub(crate) fn items<T>(items: Vec<T>) -> Json<Envelope<Items<T>>> {
    data(Items { items })
}

pub(crate) fn ack(status: &str) -> Json<Envelope<StatusAck>> {
    data(StatusAck {
        status: status.to_string(),
    })
}

/// Non-blank comma-separated values of a query parameter.
fn csv(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Parse a comma-separated enum list. Unknown values are a validation error.
pub(crate) fn parse_enum_list<T>(raw: Option<&str>) -> Result<Vec<T>, AppError>
where
    T: FromStr<Err = CoreError>,
{
    csv(raw)
        .map(|v| v.parse::<T>().map_err(AppError::from))
        .collect()
}

pub(crate) fn parse_uuid_list(name: &str, raw: Option<&str>) -> Result<Vec<Uuid>, AppError> {
    csv(raw).map(|v| parse_uuid(name, v)).collect()
}

pub(crate) fn parse_optional_uuid(name: &str, raw: Option<&str>) -> Result<Option<Uuid>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_uuid(name, v).map(Some),
        None => Ok(None),
    }
}

fn parse_uuid(name: &str, value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|_| AppError::BadRequest(format!("invalid {name}: {value:?}")))
}

/// Which end of a calendar day a bare `YYYY-MM-DD` bound stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DayBound {
    Start,
    End,
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` date (UTC).
pub(crate) fn parse_date(
    name: &str,
    raw: Option<&str>,
    bound: DayBound,
) -> Result<Option<DateTime<Utc>>, AppError> {
    let Some(value) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let day = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid {name}: {value:?}")))?;
    let time = match bound {
        DayBound::Start => day.and_hms_opt(0, 0, 0),
        DayBound::End => day.and_hms_nano_opt(23, 59, 59, 999_999_999),
    };
    Ok(time.map(|t| t.and_utc()))
}

/// Lenient integer parameter: anything unparsable is ignored.
pub(crate) fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vio_state::ViolationStatus;

    #[test]
    fn enum_lists_are_case_insensitive_and_trimmed() {
        let parsed: Vec<ViolationStatus> = parse_enum_list(Some(" open, Fixed ,,")).unwrap();
        assert_eq!(parsed, vec![ViolationStatus::Open, ViolationStatus::Fixed]);
    }

    #[test]
    fn unknown_enum_value_is_validation_error() {
        let err = parse_enum_list::<ViolationStatus>(Some("OPEN,PENDING")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn malformed_uuid_is_bad_request() {
        let err = parse_uuid_list("contractor_id", Some("nope")).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(parse_optional_uuid("driver_id", Some("  ")).unwrap(), None);
    }

    #[test]
    fn dates_accept_rfc3339_and_plain_days() {
        let ts = parse_date("date_from", Some("2024-03-01T10:00:00+05:00"), DayBound::Start)
            .unwrap()
            .unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T05:00:00+00:00");

        let start = parse_date("date_from", Some("2024-03-01"), DayBound::Start)
            .unwrap()
            .unwrap();
        let end = parse_date("date_to", Some("2024-03-01"), DayBound::End)
            .unwrap()
            .unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(end > start);
        assert_eq!(end.date_naive(), start.date_naive());

        assert!(parse_date("date_to", Some("yesterday"), DayBound::End).is_err());
    }

    #[test]
    fn bad_integers_are_ignored() {
        assert_eq!(parse_int(Some("25")), Some(25));
        assert_eq!(parse_int(Some("lots")), None);
        assert_eq!(parse_int(None), None);
    }
}
