//! Violation listing, details, manual creation and manual status changes.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vio_core::{DetectedBy, Principal, Role, Scope, Severity, ViolationType};
use vio_state::ViolationStatus;

use super::{non_blank, ServiceError};
use crate::model::{Violation, ViolationDetails, ViolationRecord, ViolationStatusLog};
use crate::scope::resolve_scope;
use crate::store::{Store, ViolationChange, ViolationFilter};

/// A violation filed by hand against a trip.
#[derive(Debug, Clone)]
pub struct ManualViolationInput {
    pub trip_id: Uuid,
    pub violation_type: ViolationType,
    pub detected_by: DetectedBy,
    pub severity: Severity,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StatusUpdateInput {
    pub status: ViolationStatus,
    /// Audit note. When non-blank it also replaces the description.
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct ViolationService {
    store: Arc<dyn Store>,
}

impl ViolationService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Violations visible to `principal`, newest first, enriched with their
    /// latest appeal. The technical scope only lists violations that carry a
    /// camera-error appeal.
    pub async fn list(
        &self,
        principal: &Principal,
        filter: ViolationFilter,
    ) -> Result<Vec<ViolationRecord>, ServiceError> {
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let records = self.store.list_violations(&scope, &filter).await?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.violation.id).collect();
        let mut summaries = self.store.summarize(&ids).await?;
        let camera_only = scope == Scope::Technical;

        Ok(records
            .into_iter()
            .filter_map(|record| {
                let summary = summaries.remove(&record.violation.id).unwrap_or_default();
                if camera_only && !summary.has_camera_reason {
                    return None;
                }
                Some(record.with_summary(summary))
            })
            .collect())
    }

    pub async fn details(
        &self,
        principal: &Principal,
        violation_id: Uuid,
    ) -> Result<ViolationDetails, ServiceError> {
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let record = self
            .store
            .get_violation(&scope, violation_id)
            .await?
            .ok_or(ServiceError::NotFound("violation"))?;

        let summary = self
            .store
            .summarize(&[violation_id])
            .await?
            .remove(&violation_id)
            .unwrap_or_default();
        let appeals = self
            .store
            .appeals_for_violation(&scope, violation_id)
            .await?;
        let history = self.store.violation_history(violation_id).await?;

        Ok(ViolationDetails {
            record: record.with_summary(summary),
            appeals,
            history,
        })
    }

    /// File a violation by hand. City authority may file against any trip;
    /// an oversight body only against trips of its own contractors (or trips
    /// with no contractor).
    pub async fn create_manual(
        &self,
        principal: &Principal,
        input: ManualViolationInput,
    ) -> Result<ViolationRecord, ServiceError> {
        if !principal.role.is_reviewer() {
            return Err(ServiceError::PermissionDenied(format!(
                "role {} cannot file violations",
                principal.role
            )));
        }
        let scope = resolve_scope(self.store.as_ref(), principal).await?;

        let link = self
            .store
            .trip_link(input.trip_id)
            .await?
            .ok_or(ServiceError::NotFound("trip"))?;
        if link.contractor_id.is_some()
            && principal.role != Role::CityAuthority
            && !scope.covers_contractor(link.contractor_id)
        {
            return Err(ServiceError::PermissionDenied(
                "trip belongs to a contractor outside your scope".to_string(),
            ));
        }

        let now = Utc::now();
        let violation = Violation {
            id: Uuid::new_v4(),
            trip_id: link.trip_id,
            violation_type: input.violation_type,
            detected_by: input.detected_by,
            severity: input.severity,
            status: ViolationStatus::Open,
            description: non_blank(input.description.as_deref()),
            created_at: now,
            updated_at: now,
        };
        let log = ViolationStatusLog {
            id: Uuid::new_v4(),
            violation_id: violation.id,
            old_status: None,
            new_status: ViolationStatus::Open,
            note: Some("manual creation".to_string()),
            changed_by: Some(principal.user_id),
            created_at: now,
        };
        self.store
            .create_violation(&violation, &log, violation.description.as_deref())
            .await?;

        metrics::counter!("violations_created_total").increment(1);
        tracing::info!(
            violation_id = %violation.id,
            trip_id = %violation.trip_id,
            actor = %principal.user_id,
            violation_type = %violation.violation_type,
            "violation filed manually"
        );

        let record = self.store.get_violation(&scope, violation.id).await?;
        Ok(record.unwrap_or_else(|| ViolationRecord::bare(violation)))
    }

    /// Move a violation out of OPEN by hand.
    pub async fn update_status(
        &self,
        principal: &Principal,
        violation_id: Uuid,
        input: StatusUpdateInput,
    ) -> Result<(), ServiceError> {
        if !principal.role.is_reviewer() {
            return Err(ServiceError::PermissionDenied(format!(
                "role {} cannot change violation status",
                principal.role
            )));
        }
        let scope = resolve_scope(self.store.as_ref(), principal).await?;
        let record = self
            .store
            .get_violation(&scope, violation_id)
            .await?
            .ok_or(ServiceError::NotFound("violation"))?;

        let from = record.violation.status;
        let to = from.transition_to(input.status)?;
        let note = non_blank(input.note.as_deref());

        let change = ViolationChange {
            violation_id,
            from,
            to,
            description: note.clone(),
            log: ViolationStatusLog {
                id: Uuid::new_v4(),
                violation_id,
                old_status: Some(from),
                new_status: to,
                note,
                changed_by: Some(principal.user_id),
                created_at: Utc::now(),
            },
        };
        self.store.update_violation_status(&change).await?;

        tracing::info!(
            violation_id = %violation_id,
            actor = %principal.user_id,
            from = %from,
            to = %to,
            "violation status changed"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ViolationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViolationService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, OrgFact, TicketFact, TripFact};
    use crate::store::ViolationStore;

    struct World {
        store: Arc<MemoryStore>,
        service: ViolationService,
        oversight_org: Uuid,
        contractor: Uuid,
        trip: Uuid,
    }

    fn world() -> World {
        let store = Arc::new(MemoryStore::new());
        let oversight_org = Uuid::new_v4();
        let contractor = Uuid::new_v4();
        let ticket = Uuid::new_v4();
        let trip = Uuid::new_v4();
        store.insert_organization(OrgFact {
            id: contractor,
            name: "Tazalyk".into(),
            parent_org_id: Some(oversight_org),
            is_contractor: true,
            is_active: true,
        });
        store.insert_ticket(TicketFact {
            id: ticket,
            contractor_id: Some(contractor),
            cleaning_area_id: None,
            status: "IN_PROGRESS".into(),
            planned_start_at: None,
            planned_end_at: None,
        });
        store.insert_trip(TripFact {
            id: trip,
            ticket_id: Some(ticket),
            driver_id: None,
            vehicle_id: None,
            polygon_id: None,
            status: "OK".into(),
            entry_at: None,
            violation_reason: None,
        });
        World {
            service: ViolationService::new(store.clone()),
            store,
            oversight_org,
            contractor,
            trip,
        }
    }

    fn principal(role: Role, org_id: Uuid) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            org_id,
            role,
            driver_id: None,
        }
    }

    fn input(trip_id: Uuid) -> ManualViolationInput {
        ManualViolationInput {
            trip_id,
            violation_type: ViolationType::ForeignArea,
            detected_by: DetectedBy::LocationTracking,
            severity: Severity::High,
            description: Some("  left the assigned area  ".into()),
        }
    }

    #[tokio::test]
    async fn oversight_files_against_own_contractor() {
        let w = world();
        let body = principal(Role::OversightBody, w.oversight_org);
        let record = w.service.create_manual(&body, input(w.trip)).await.unwrap();
        assert_eq!(record.violation.status, ViolationStatus::Open);
        assert_eq!(
            record.violation.description.as_deref(),
            Some("left the assigned area")
        );
        assert_eq!(record.contractor.map(|c| c.id), Some(w.contractor));

        let history = w.store.violation_history(record.violation.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].note.as_deref(), Some("manual creation"));
        assert_eq!(history[0].changed_by, Some(body.user_id));
    }

    #[tokio::test]
    async fn oversight_cannot_file_against_foreign_contractor() {
        let w = world();
        let stranger = principal(Role::OversightBody, Uuid::new_v4());
        let err = w
            .service
            .create_manual(&stranger, input(w.trip))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn city_files_against_any_trip() {
        let w = world();
        let city = principal(Role::CityAuthority, Uuid::new_v4());
        assert!(w.service.create_manual(&city, input(w.trip)).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let w = world();
        let city = principal(Role::CityAuthority, Uuid::new_v4());
        let err = w
            .service
            .create_manual(&city, input(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("trip")));
    }

    #[tokio::test]
    async fn contractor_cannot_file() {
        let w = world();
        let admin = principal(Role::ContractorAdmin, w.contractor);
        let err = w
            .service
            .create_manual(&admin, input(w.trip))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn status_update_is_one_way() {
        let w = world();
        let city = principal(Role::CityAuthority, Uuid::new_v4());
        let record = w.service.create_manual(&city, input(w.trip)).await.unwrap();
        let id = record.violation.id;

        w.service
            .update_status(
                &city,
                id,
                StatusUpdateInput {
                    status: ViolationStatus::Fixed,
                    note: Some("driver fined".into()),
                },
            )
            .await
            .unwrap();

        let details = w.service.details(&city, id).await.unwrap();
        assert_eq!(details.record.violation.status, ViolationStatus::Fixed);
        assert_eq!(
            details.record.violation.description.as_deref(),
            Some("driver fined")
        );
        assert_eq!(details.history.len(), 2);

        let err = w
            .service
            .update_status(
                &city,
                id,
                StatusUpdateInput {
                    status: ViolationStatus::Canceled,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));
        assert_eq!(w.store.violation_history(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_note_keeps_description() {
        let w = world();
        let city = principal(Role::CityAuthority, Uuid::new_v4());
        let record = w.service.create_manual(&city, input(w.trip)).await.unwrap();
        let id = record.violation.id;

        w.service
            .update_status(
                &city,
                id,
                StatusUpdateInput {
                    status: ViolationStatus::Canceled,
                    note: Some("   ".into()),
                },
            )
            .await
            .unwrap();
        let details = w.service.details(&city, id).await.unwrap();
        assert_eq!(
            details.record.violation.description.as_deref(),
            Some("left the assigned area")
        );
    }

    #[tokio::test]
    async fn reopening_is_rejected() {
        let w = world();
        let city = principal(Role::CityAuthority, Uuid::new_v4());
        let record = w.service.create_manual(&city, input(w.trip)).await.unwrap();
        let err = w
            .service
            .update_status(
                &city,
                record.violation.id,
                StatusUpdateInput {
                    status: ViolationStatus::Open,
                    note: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatusTransition(_)));
    }
}
