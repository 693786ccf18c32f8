//! # Record Types
//!
//! Rows and views exchanged between the stores, the services and the HTTP
//! layer. Enum-typed fields use the closed vocabularies from `vio-core` and
//! `vio-state`; they are documented as strings in the OpenAPI schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use vio_core::{Attribution, DetectedBy, FileType, ReasonCode, Role, Severity, ViolationType};
use vio_state::{AppealStatus, ViolationStatus};

// -- Violations ---------------------------------------------------------------

/// A violation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Violation {
    pub id: Uuid,
    pub trip_id: Uuid,
    #[serde(rename = "type")]
    #[schema(value_type = String)]
    pub violation_type: ViolationType,
    #[schema(value_type = String)]
    pub detected_by: DetectedBy,
    #[schema(value_type = String)]
    pub severity: Severity,
    #[schema(value_type = String)]
    pub status: ViolationStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrgBrief {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TicketBrief {
    pub id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DriverBrief {
    pub id: Uuid,
    pub full_name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VehicleBrief {
    pub id: Uuid,
    pub plate_number: String,
    pub brand: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AreaBrief {
    pub id: Uuid,
    pub name: String,
}

/// Latest appeal on a violation, as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealBrief {
    pub id: Uuid,
    #[schema(value_type = String)]
    pub status: AppealStatus,
    #[schema(value_type = String)]
    pub reason_code: ReasonCode,
    pub reason_text: String,
    pub created_at: DateTime<Utc>,
}

/// A violation enriched with its trip context and appeal summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationRecord {
    pub violation: Violation,
    pub trip_status: Option<String>,
    pub trip_entry_at: Option<DateTime<Utc>>,
    pub trip_violation_reason: Option<String>,
    pub contractor: Option<OrgBrief>,
    pub ticket: Option<TicketBrief>,
    pub driver: Option<DriverBrief>,
    pub vehicle: Option<VehicleBrief>,
    #[serde(rename = "cleaning_area")]
    pub area: Option<AreaBrief>,
    pub polygon_name: Option<String>,
    pub last_appeal: Option<AppealBrief>,
    pub has_active_appeal: bool,
}

impl ViolationRecord {
    /// A record with no trip context.
    pub fn bare(violation: Violation) -> Self {
        Self {
            violation,
            trip_status: None,
            trip_entry_at: None,
            trip_violation_reason: None,
            contractor: None,
            ticket: None,
            driver: None,
            vehicle: None,
            area: None,
            polygon_name: None,
            last_appeal: None,
            has_active_appeal: false,
        }
    }

    /// Scope-relevant facts of this violation.
    pub fn attribution(&self) -> Attribution {
        Attribution {
            contractor_id: self.contractor.as_ref().map(|c| c.id),
            driver_id: self.driver.as_ref().map(|d| d.id),
            detected_by: self.violation.detected_by,
        }
    }

    /// Attach the appeal summary computed for this violation.
    pub fn with_summary(mut self, summary: AppealSummary) -> Self {
        self.last_appeal = summary.last_appeal;
        self.has_active_appeal = summary.has_active_appeal;
        self
    }
}

/// Violation with everything needed for its detail page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ViolationDetails {
    pub record: ViolationRecord,
    /// Appeals on this violation visible to the caller, oldest first.
    pub appeals: Vec<AppealDetail>,
    pub history: Vec<ViolationStatusLog>,
}

// -- Appeals ------------------------------------------------------------------

/// An appeal row. `ticket_id`, `driver_id` and `contractor_id` are a snapshot
/// of the violation's trip taken when the appeal was filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Appeal {
    pub id: Uuid,
    pub violation_id: Uuid,
    pub trip_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    #[schema(value_type = String)]
    pub reason_code: ReasonCode,
    pub reason_text: String,
    #[schema(value_type = String)]
    pub status: AppealStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appeal {
    pub fn brief(&self) -> AppealBrief {
        AppealBrief {
            id: self.id,
            status: self.status,
            reason_code: self.reason_code,
            reason_text: self.reason_text.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealComment {
    pub id: Uuid,
    pub appeal_id: Uuid,
    pub author_id: Uuid,
    #[schema(value_type = String)]
    pub author_role: Role,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealAttachment {
    pub id: Uuid,
    pub appeal_id: Uuid,
    pub file_url: String,
    #[schema(value_type = String)]
    pub file_type: FileType,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Appeal as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealView {
    pub appeal: Appeal,
    pub violation: Violation,
    pub driver: Option<DriverBrief>,
}

/// Appeal with its conversation and audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealDetail {
    pub appeal: Appeal,
    pub violation: Violation,
    pub driver: Option<DriverBrief>,
    pub comments: Vec<AppealComment>,
    pub attachments: Vec<AppealAttachment>,
    pub history: Vec<AppealStatusLog>,
}

/// Per-violation appeal summary used to enrich listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppealSummary {
    pub last_appeal: Option<AppealBrief>,
    pub has_active_appeal: bool,
    pub has_camera_reason: bool,
}

impl AppealSummary {
    /// Fold one appeal into the summary. Appeals must be fed newest first.
    pub fn absorb(&mut self, appeal: &Appeal) {
        if self.last_appeal.is_none() {
            self.last_appeal = Some(appeal.brief());
        }
        if appeal.status.is_active() {
            self.has_active_appeal = true;
        }
        if appeal.reason_code == ReasonCode::CameraError {
            self.has_camera_reason = true;
        }
    }
}

// -- Audit trail --------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ViolationStatusLog {
    pub id: Uuid,
    pub violation_id: Uuid,
    #[schema(value_type = Option<String>)]
    pub old_status: Option<ViolationStatus>,
    #[schema(value_type = String)]
    pub new_status: ViolationStatus,
    pub note: Option<String>,
    /// `None` for rows written by the automatic detection trigger.
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AppealStatusLog {
    pub id: Uuid,
    pub appeal_id: Uuid,
    #[schema(value_type = Option<String>)]
    pub old_status: Option<AppealStatus>,
    #[schema(value_type = String)]
    pub new_status: AppealStatus,
    pub note: Option<String>,
    pub changed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// -- Directory ----------------------------------------------------------------

/// A trip's linkage as needed for manual violation creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripLink {
    pub trip_id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub contractor_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appeal(status: AppealStatus, reason: ReasonCode, age_secs: i64) -> Appeal {
        let at = Utc::now() - chrono::Duration::seconds(age_secs);
        Appeal {
            id: Uuid::new_v4(),
            violation_id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            ticket_id: None,
            driver_id: None,
            contractor_id: None,
            reason_code: reason,
            reason_text: "reason text".into(),
            status,
            resolved_by: None,
            resolved_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn summary_keeps_first_absorbed_as_latest() {
        let newest = appeal(AppealStatus::Closed, ReasonCode::Other, 0);
        let older = appeal(AppealStatus::Submitted, ReasonCode::CameraError, 60);
        let mut summary = AppealSummary::default();
        summary.absorb(&newest);
        summary.absorb(&older);
        assert_eq!(summary.last_appeal.as_ref().map(|b| b.id), Some(newest.id));
        assert!(summary.has_active_appeal);
        assert!(summary.has_camera_reason);
    }

    #[test]
    fn empty_summary_has_no_flags() {
        let summary = AppealSummary::default();
        assert!(summary.last_appeal.is_none());
        assert!(!summary.has_active_appeal);
        assert!(!summary.has_camera_reason);
    }

    #[test]
    fn violation_serializes_type_field() {
        let now = Utc::now();
        let v = Violation {
            id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            violation_type: ViolationType::OverCapacity,
            detected_by: DetectedBy::VolumeSensor,
            severity: Severity::High,
            status: ViolationStatus::Open,
            description: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "OVER_CAPACITY");
        assert_eq!(json["detected_by"], "VOLUME");
        assert_eq!(json["status"], "OPEN");
    }
}
