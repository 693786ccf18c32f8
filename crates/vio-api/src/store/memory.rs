//! # In-Memory Store
//!
//! A [`Store`] backed by process memory, used by tests and local runs without
//! a database. It holds the same tables the Postgres schema does, including
//! the directory tables (trips, tickets, organizations, drivers, vehicles,
//! cleaning areas, polygons) that production reads from other systems.
//!
//! Writes are staged on a copy of the tables under the write lock and
//! swapped in only when every step succeeds, which gives each write method
//! the same all-or-nothing behavior as a database transaction. The
//! single-active-appeal rule is checked inside that lock and plays the role
//! of the partial unique index.

use std::collections::HashMap;
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;
use vio_core::Scope;
use vio_state::ViolationStatus;

use super::{
    page_limit, page_offset, AppealChange, AppealFilter, AppealStore, Directory, NewComment,
    Store, StoreError, ViolationChange, ViolationFilter, ViolationStore,
};
use crate::model::{
    Appeal, AppealAttachment, AppealComment, AppealDetail, AppealStatusLog, AppealSummary,
    AppealView, AreaBrief, DriverBrief, OrgBrief, TicketBrief, TripLink, VehicleBrief, Violation,
    ViolationRecord, ViolationStatusLog,
};

// -- Directory facts ----------------------------------------------------------

/// A trip as known to the directory.
#[derive(Debug, Clone)]
pub struct TripFact {
    pub id: Uuid,
    pub ticket_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub polygon_id: Option<Uuid>,
    pub status: String,
    pub entry_at: Option<DateTime<Utc>>,
    pub violation_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TicketFact {
    pub id: Uuid,
    pub contractor_id: Option<Uuid>,
    pub cleaning_area_id: Option<Uuid>,
    pub status: String,
    pub planned_start_at: Option<DateTime<Utc>>,
    pub planned_end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct OrgFact {
    pub id: Uuid,
    pub name: String,
    pub parent_org_id: Option<Uuid>,
    pub is_contractor: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    violations: HashMap<Uuid, Violation>,
    appeals: HashMap<Uuid, Appeal>,
    comments: Vec<AppealComment>,
    attachments: Vec<AppealAttachment>,
    violation_log: Vec<ViolationStatusLog>,
    appeal_log: Vec<AppealStatusLog>,

    trips: HashMap<Uuid, TripFact>,
    tickets: HashMap<Uuid, TicketFact>,
    organizations: HashMap<Uuid, OrgFact>,
    drivers: HashMap<Uuid, DriverBrief>,
    vehicles: HashMap<Uuid, VehicleBrief>,
    areas: HashMap<Uuid, AreaBrief>,
    polygons: HashMap<Uuid, String>,
}

/// Process-local store. Cheap to construct; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(any(test, feature = "test-util"))]
    fail_violation_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Seeding --------------------------------------------------------------

    pub fn insert_organization(&self, org: OrgFact) {
        self.tables.write().organizations.insert(org.id, org);
    }

    pub fn insert_ticket(&self, ticket: TicketFact) {
        self.tables.write().tickets.insert(ticket.id, ticket);
    }

    pub fn insert_trip(&self, trip: TripFact) {
        self.tables.write().trips.insert(trip.id, trip);
    }

    pub fn insert_driver(&self, driver: DriverBrief) {
        self.tables.write().drivers.insert(driver.id, driver);
    }

    pub fn insert_vehicle(&self, vehicle: VehicleBrief) {
        self.tables.write().vehicles.insert(vehicle.id, vehicle);
    }

    pub fn insert_area(&self, area: AreaBrief) {
        self.tables.write().areas.insert(area.id, area);
    }

    pub fn insert_polygon(&self, id: Uuid, name: impl Into<String>) {
        self.tables.write().polygons.insert(id, name.into());
    }

    /// Reassign a ticket to another contractor, as the dispatch system would.
    pub fn reassign_ticket(&self, ticket_id: Uuid, contractor_id: Option<Uuid>) {
        if let Some(ticket) = self.tables.write().tickets.get_mut(&ticket_id) {
            ticket.contractor_id = contractor_id;
        }
    }

    /// Record a violation the way the automatic detector does: status OPEN
    /// and a log row without an actor.
    pub fn record_detected(&self, violation: Violation) {
        let log = ViolationStatusLog {
            id: Uuid::new_v4(),
            violation_id: violation.id,
            old_status: None,
            new_status: violation.status,
            note: Some("automatic detection".to_string()),
            changed_by: None,
            created_at: violation.created_at,
        };
        let mut tables = self.tables.write();
        tables.violations.insert(violation.id, violation);
        tables.violation_log.push(log);
    }

    /// Make every subsequent violation status write fail. Appeal writes in
    /// the same unit of work are rolled back with it. Only built for tests
    /// and under the `test-util` feature.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_violation_writes(&self, fail: bool) {
        self.fail_violation_writes.store(fail, Ordering::SeqCst);
    }

    // -- Internals ------------------------------------------------------------

    /// Run `f` against a staged copy of the tables and publish the copy only
    /// if `f` succeeds.
    fn write<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<(), StoreError>,
    {
        let mut guard = self.tables.write();
        let mut staged = guard.clone();
        f(&mut staged)?;
        *guard = staged;
        Ok(())
    }

    fn apply_violation_change(
        &self,
        tables: &mut Tables,
        change: &ViolationChange,
    ) -> Result<(), StoreError> {
        let violation = tables
            .violations
            .get_mut(&change.violation_id)
            .ok_or(StoreError::Missing {
                entity: "violation",
                id: change.violation_id,
            })?;
        if violation.status != change.from {
            return Err(StoreError::StaleStatus {
                entity: "violation",
                id: change.violation_id,
                expected: change.from.to_string(),
            });
        }
        #[cfg(any(test, feature = "test-util"))]
        if self.fail_violation_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("violation write failed".to_string()));
        }
        violation.status = change.to;
        if let Some(description) = &change.description {
            violation.description = Some(description.clone());
        }
        violation.updated_at = change.log.created_at;
        tables.violation_log.push(change.log.clone());
        Ok(())
    }
}

impl Tables {
    fn record(&self, violation: &Violation) -> ViolationRecord {
        let trip = self.trips.get(&violation.trip_id);
        let ticket = trip
            .and_then(|t| t.ticket_id)
            .and_then(|id| self.tickets.get(&id));

        let contractor = ticket.and_then(|t| t.contractor_id).map(|id| OrgBrief {
            id,
            name: self
                .organizations
                .get(&id)
                .map(|o| o.name.clone())
                .unwrap_or_default(),
        });
        let driver = trip.and_then(|t| t.driver_id).map(|id| self.driver_brief(id));
        let vehicle = trip.and_then(|t| t.vehicle_id).map(|id| {
            self.vehicles.get(&id).cloned().unwrap_or(VehicleBrief {
                id,
                plate_number: String::new(),
                brand: String::new(),
                model: String::new(),
            })
        });
        let area = ticket.and_then(|t| t.cleaning_area_id).map(|id| AreaBrief {
            id,
            name: self.areas.get(&id).map(|a| a.name.clone()).unwrap_or_default(),
        });

        ViolationRecord {
            violation: violation.clone(),
            trip_status: trip.map(|t| t.status.clone()),
            trip_entry_at: trip.and_then(|t| t.entry_at),
            trip_violation_reason: trip.and_then(|t| t.violation_reason.clone()),
            contractor,
            ticket: ticket.map(|t| TicketBrief {
                id: t.id,
                status: t.status.clone(),
                planned_start_at: t.planned_start_at,
                planned_end_at: t.planned_end_at,
            }),
            driver,
            vehicle,
            area,
            polygon_name: trip
                .and_then(|t| t.polygon_id)
                .and_then(|id| self.polygons.get(&id).cloned()),
            last_appeal: None,
            has_active_appeal: false,
        }
    }

    fn driver_brief(&self, id: Uuid) -> DriverBrief {
        self.drivers.get(&id).cloned().unwrap_or(DriverBrief {
            id,
            full_name: String::new(),
            phone: String::new(),
        })
    }

    /// The violation behind `violation_id`, if `scope` admits it.
    fn visible_violation(&self, scope: &Scope, violation_id: Uuid) -> Option<ViolationRecord> {
        let violation = self.violations.get(&violation_id)?;
        let record = self.record(violation);
        scope.admits(&record.attribution()).then_some(record)
    }

    fn detail(&self, appeal: &Appeal, violation: &Violation) -> AppealDetail {
        let mut comments: Vec<AppealComment> = self
            .comments
            .iter()
            .filter(|c| c.appeal_id == appeal.id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| c.created_at);

        let mut attachments: Vec<AppealAttachment> = self
            .attachments
            .iter()
            .filter(|a| a.appeal_id == appeal.id)
            .cloned()
            .collect();
        attachments.sort_by_key(|a| a.created_at);

        let mut history: Vec<AppealStatusLog> = self
            .appeal_log
            .iter()
            .filter(|l| l.appeal_id == appeal.id)
            .cloned()
            .collect();
        history.sort_by_key(|l| l.created_at);

        AppealDetail {
            appeal: appeal.clone(),
            violation: violation.clone(),
            driver: appeal.driver_id.map(|id| self.driver_brief(id)),
            comments,
            attachments,
            history,
        }
    }

    fn insert_comment(&mut self, new: &NewComment) -> Result<(), StoreError> {
        let appeal_id = new.comment.appeal_id;
        if !self.appeals.contains_key(&appeal_id) {
            return Err(StoreError::Missing {
                entity: "appeal",
                id: appeal_id,
            });
        }
        self.comments.push(new.comment.clone());
        self.attachments.extend(new.attachments.iter().cloned());
        Ok(())
    }

    fn apply_appeal_change(&mut self, change: &AppealChange) -> Result<(), StoreError> {
        let appeal = self
            .appeals
            .get_mut(&change.appeal_id)
            .ok_or(StoreError::Missing {
                entity: "appeal",
                id: change.appeal_id,
            })?;
        if appeal.status != change.from {
            return Err(StoreError::StaleStatus {
                entity: "appeal",
                id: change.appeal_id,
                expected: change.from.to_string(),
            });
        }
        appeal.status = change.to;
        appeal.resolved_by = change.resolved_by;
        appeal.resolved_at = change.resolved_at;
        appeal.updated_at = change.log.created_at;
        self.appeal_log.push(change.log.clone());
        Ok(())
    }
}

fn within(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map_or(true, |f| at >= f) && to.map_or(true, |t| at <= t)
}

fn page<T>(items: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let skip = usize::try_from(page_offset(offset)).unwrap_or(usize::MAX);
    let take = usize::try_from(page_limit(limit)).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}

fn matches_violation(record: &ViolationRecord, filter: &ViolationFilter) -> bool {
    let v = &record.violation;
    if !filter.statuses.is_empty() && !filter.statuses.contains(&v.status) {
        return false;
    }
    if !filter.types.is_empty() && !filter.types.contains(&v.violation_type) {
        return false;
    }
    if !filter.severities.is_empty() && !filter.severities.contains(&v.severity) {
        return false;
    }
    if !filter.detected_by.is_empty() && !filter.detected_by.contains(&v.detected_by) {
        return false;
    }
    let contractor_id = record.contractor.as_ref().map(|c| c.id);
    if !filter.contractor_ids.is_empty()
        && !contractor_id.is_some_and(|c| filter.contractor_ids.contains(&c))
    {
        return false;
    }
    if filter.driver_id.is_some() && filter.driver_id != record.driver.as_ref().map(|d| d.id) {
        return false;
    }
    if filter.ticket_id.is_some() && filter.ticket_id != record.ticket.as_ref().map(|t| t.id) {
        return false;
    }
    if filter.cleaning_area_id.is_some()
        && filter.cleaning_area_id != record.area.as_ref().map(|a| a.id)
    {
        return false;
    }
    let occurred_at = record.trip_entry_at.unwrap_or(v.created_at);
    if !within(occurred_at, filter.date_from, filter.date_to) {
        return false;
    }
    if let Some(term) = filter.search.as_deref().map(str::to_lowercase) {
        let name_hit = record
            .driver
            .as_ref()
            .is_some_and(|d| d.full_name.to_lowercase().contains(&term));
        let plate_hit = record
            .vehicle
            .as_ref()
            .is_some_and(|vh| vh.plate_number.to_lowercase().contains(&term));
        if !name_hit && !plate_hit {
            return false;
        }
    }
    true
}

fn matches_appeal(appeal: &Appeal, record: &ViolationRecord, filter: &AppealFilter) -> bool {
    let violation = &record.violation;
    if !filter.statuses.is_empty() && !filter.statuses.contains(&appeal.status) {
        return false;
    }
    if !filter.reason_codes.is_empty() && !filter.reason_codes.contains(&appeal.reason_code) {
        return false;
    }
    if !filter.violation_types.is_empty()
        && !filter.violation_types.contains(&violation.violation_type)
    {
        return false;
    }
    let contractor_id = record.contractor.as_ref().map(|c| c.id);
    if !filter.contractor_ids.is_empty()
        && !contractor_id.is_some_and(|c| filter.contractor_ids.contains(&c))
    {
        return false;
    }
    if filter
        .driver_id
        .is_some_and(|d| record.driver.as_ref().map(|x| x.id) != Some(d))
    {
        return false;
    }
    if filter.violation_id.is_some_and(|v| v != appeal.violation_id) {
        return false;
    }
    within(appeal.created_at, filter.date_from, filter.date_to)
}

// -- Trait impls --------------------------------------------------------------

#[async_trait]
impl Directory for MemoryStore {
    async fn child_contractors(&self, org_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.tables.read();
        let mut ids: Vec<Uuid> = tables
            .organizations
            .values()
            .filter(|o| o.parent_org_id == Some(org_id) && o.is_contractor && o.is_active)
            .map(|o| o.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn trip_link(&self, trip_id: Uuid) -> Result<Option<TripLink>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.trips.get(&trip_id).map(|trip| {
            let ticket = trip.ticket_id.and_then(|id| tables.tickets.get(&id));
            TripLink {
                trip_id: trip.id,
                ticket_id: trip.ticket_id,
                contractor_id: ticket.and_then(|t| t.contractor_id),
                driver_id: trip.driver_id,
            }
        }))
    }
}

#[async_trait]
impl ViolationStore for MemoryStore {
    async fn list_violations(
        &self,
        scope: &Scope,
        filter: &ViolationFilter,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let mut records: Vec<ViolationRecord> = tables
            .violations
            .values()
            .map(|v| tables.record(v))
            .filter(|r| scope.admits(&r.attribution()))
            .filter(|r| matches_violation(r, filter))
            .collect();
        records.sort_by(|a, b| b.violation.created_at.cmp(&a.violation.created_at));
        Ok(page(records, filter.limit, filter.offset))
    }

    async fn get_violation(
        &self,
        scope: &Scope,
        id: Uuid,
    ) -> Result<Option<ViolationRecord>, StoreError> {
        Ok(self.tables.read().visible_violation(scope, id))
    }

    async fn create_violation(
        &self,
        violation: &Violation,
        log: &ViolationStatusLog,
        trip_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.write(|tables| {
            let trip = tables
                .trips
                .get_mut(&violation.trip_id)
                .ok_or(StoreError::Missing {
                    entity: "trip",
                    id: violation.trip_id,
                })?;
            if let Some(reason) = trip_reason {
                trip.violation_reason = Some(reason.to_string());
            }
            tables.violations.insert(violation.id, violation.clone());
            tables.violation_log.push(log.clone());
            Ok(())
        })
    }

    async fn update_violation_status(&self, change: &ViolationChange) -> Result<(), StoreError> {
        self.write(|tables| self.apply_violation_change(tables, change))
    }

    async fn violation_history(&self, id: Uuid) -> Result<Vec<ViolationStatusLog>, StoreError> {
        let tables = self.tables.read();
        let mut history: Vec<ViolationStatusLog> = tables
            .violation_log
            .iter()
            .filter(|l| l.violation_id == id)
            .cloned()
            .collect();
        history.sort_by_key(|l| l.created_at);
        Ok(history)
    }
}

#[async_trait]
impl AppealStore for MemoryStore {
    async fn list_appeals(
        &self,
        scope: &Scope,
        filter: &AppealFilter,
    ) -> Result<Vec<AppealView>, StoreError> {
        if scope.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read();
        let mut views: Vec<AppealView> = tables
            .appeals
            .values()
            .filter_map(|appeal| {
                let record = tables.visible_violation(scope, appeal.violation_id)?;
                matches_appeal(appeal, &record, filter).then(|| AppealView {
                    appeal: appeal.clone(),
                    violation: record.violation,
                    driver: appeal.driver_id.map(|id| tables.driver_brief(id)),
                })
            })
            .collect();
        views.sort_by(|a, b| b.appeal.created_at.cmp(&a.appeal.created_at));
        Ok(page(views, filter.limit, filter.offset))
    }

    async fn get_appeal(&self, scope: &Scope, id: Uuid) -> Result<Option<AppealDetail>, StoreError> {
        let tables = self.tables.read();
        let Some(appeal) = tables.appeals.get(&id) else {
            return Ok(None);
        };
        Ok(tables
            .visible_violation(scope, appeal.violation_id)
            .map(|record| tables.detail(appeal, &record.violation)))
    }

    async fn appeals_for_violation(
        &self,
        scope: &Scope,
        violation_id: Uuid,
    ) -> Result<Vec<AppealDetail>, StoreError> {
        let tables = self.tables.read();
        let Some(record) = tables.visible_violation(scope, violation_id) else {
            return Ok(Vec::new());
        };
        let mut appeals: Vec<&Appeal> = tables
            .appeals
            .values()
            .filter(|a| a.violation_id == violation_id)
            .collect();
        appeals.sort_by_key(|a| a.created_at);
        Ok(appeals
            .into_iter()
            .map(|a| tables.detail(a, &record.violation))
            .collect())
    }

    async fn count_active(&self, violation_id: Uuid) -> Result<i64, StoreError> {
        let tables = self.tables.read();
        let count = tables
            .appeals
            .values()
            .filter(|a| a.violation_id == violation_id && a.status.is_active())
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn summarize(
        &self,
        violation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AppealSummary>, StoreError> {
        let tables = self.tables.read();
        let mut appeals: Vec<&Appeal> = tables
            .appeals
            .values()
            .filter(|a| violation_ids.contains(&a.violation_id))
            .collect();
        appeals.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut summaries: HashMap<Uuid, AppealSummary> = HashMap::new();
        for appeal in appeals {
            summaries
                .entry(appeal.violation_id)
                .or_default()
                .absorb(appeal);
        }
        Ok(summaries)
    }

    async fn create_appeal(
        &self,
        appeal: &Appeal,
        opening: &NewComment,
        log: &AppealStatusLog,
    ) -> Result<(), StoreError> {
        self.write(|tables| {
            if !tables.violations.contains_key(&appeal.violation_id) {
                return Err(StoreError::Missing {
                    entity: "violation",
                    id: appeal.violation_id,
                });
            }
            let taken = tables
                .appeals
                .values()
                .any(|a| a.violation_id == appeal.violation_id && a.status.is_active());
            if taken && appeal.status.is_active() {
                return Err(StoreError::ActiveAppealExists {
                    violation_id: appeal.violation_id,
                });
            }
            tables.appeals.insert(appeal.id, appeal.clone());
            tables.insert_comment(opening)?;
            tables.appeal_log.push(log.clone());
            Ok(())
        })
    }

    async fn add_comment(
        &self,
        comment: &NewComment,
        reopen: Option<&AppealChange>,
    ) -> Result<(), StoreError> {
        self.write(|tables| {
            tables.insert_comment(comment)?;
            if let Some(change) = reopen {
                tables.apply_appeal_change(change)?;
            }
            Ok(())
        })
    }

    async fn apply_transition(
        &self,
        change: &AppealChange,
        cascade: Option<&ViolationChange>,
        note: Option<&NewComment>,
    ) -> Result<(), StoreError> {
        self.write(|tables| {
            tables.apply_appeal_change(change)?;
            if let Some(note) = note {
                tables.insert_comment(note)?;
            }
            if let Some(cascade) = cascade {
                self.apply_violation_change(tables, cascade)?;
            }
            Ok(())
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
