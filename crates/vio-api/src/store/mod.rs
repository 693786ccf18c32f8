//! # Storage Seams
//!
//! The services talk to persistence through three traits:
//!
//! - [`Directory`]: read-only trip/organization facts owned by other systems.
//! - [`ViolationStore`]: scoped violation reads and violation writes.
//! - [`AppealStore`]: scoped appeal reads and appeal writes, including the
//!   appeal-resolution unit of work that also updates the violation.
//!
//! [`Store`] bundles all three. Two implementations exist: the Postgres
//! store in [`crate::db`] and the in-memory [`memory::MemoryStore`].
//!
//! ## Write contract
//!
//! Every write method is one unit of work: all of its rows are written or
//! none are. Status changes carry the status they expect to replace; if the
//! stored status differs at write time the whole unit fails with
//! [`StoreError::StaleStatus`].

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;
use vio_core::{DetectedBy, ReasonCode, Scope, Severity, ViolationType};
use vio_state::{AppealStatus, ViolationStatus};

use crate::model::{
    Appeal, AppealAttachment, AppealComment, AppealDetail, AppealStatusLog, AppealSummary,
    AppealView, TripLink, Violation, ViolationRecord, ViolationStatusLog,
};

/// Default page size for listings.
pub const DEFAULT_LIMIT: i64 = 200;

// -- Errors -------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum StoreError {
    /// The partial unique index on active appeals rejected the insert.
    #[error("an active appeal already exists for violation {violation_id}")]
    ActiveAppealExists { violation_id: Uuid },

    /// A status change lost a race: the stored status is no longer the
    /// expected one.
    #[error("{entity} {id} is no longer {expected}")]
    StaleStatus {
        entity: &'static str,
        id: Uuid,
        expected: String,
    },

    /// A row referenced by a write does not exist.
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: Uuid },

    /// A stored value could not be decoded into its domain type.
    #[error("corrupt {column} value: {value:?}")]
    Corrupt { column: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-database backend failure.
    #[error("storage failure: {0}")]
    Backend(String),
}

// -- Filters ------------------------------------------------------------------

/// Caller-supplied violation filters. Scope is passed separately and is
/// always applied first.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub statuses: Vec<ViolationStatus>,
    pub types: Vec<ViolationType>,
    pub severities: Vec<Severity>,
    pub detected_by: Vec<DetectedBy>,
    pub contractor_ids: Vec<Uuid>,
    pub driver_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub cleaning_area_id: Option<Uuid>,
    /// Bounds on `COALESCE(trip.entry_at, violation.created_at)`.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of driver name or vehicle plate.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct AppealFilter {
    pub statuses: Vec<AppealStatus>,
    pub reason_codes: Vec<ReasonCode>,
    pub violation_types: Vec<ViolationType>,
    pub contractor_ids: Vec<Uuid>,
    /// Driver of the violation's trip.
    pub driver_id: Option<Uuid>,
    pub violation_id: Option<Uuid>,
    /// Bounds on the appeal's `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Resolve a requested page size: non-positive or absent means the default.
pub fn page_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(n) if n > 0 => n,
        _ => DEFAULT_LIMIT,
    }
}

pub fn page_offset(offset: Option<i64>) -> i64 {
    offset.filter(|o| *o > 0).unwrap_or(0)
}

// -- Write payloads -----------------------------------------------------------

/// A violation status change together with its audit row.
#[derive(Debug, Clone)]
pub struct ViolationChange {
    pub violation_id: Uuid,
    pub from: ViolationStatus,
    pub to: ViolationStatus,
    /// Replaces the violation description when present.
    pub description: Option<String>,
    pub log: ViolationStatusLog,
}

/// An appeal status change together with its audit row. `resolved_by` and
/// `resolved_at` are written as given, so a non-resolution status clears them.
#[derive(Debug, Clone)]
pub struct AppealChange {
    pub appeal_id: Uuid,
    pub from: AppealStatus,
    pub to: AppealStatus,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub log: AppealStatusLog,
}

/// A comment and the attachments posted with it.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub comment: AppealComment,
    pub attachments: Vec<AppealAttachment>,
}

// -- Traits -------------------------------------------------------------------

/// Read-only organization hierarchy and trip linkage.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Active contractor organizations whose parent is `org_id`.
    async fn child_contractors(&self, org_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn trip_link(&self, trip_id: Uuid) -> Result<Option<TripLink>, StoreError>;
}

#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Newest first. Records come back without appeal summaries.
    async fn list_violations(
        &self,
        scope: &Scope,
        filter: &ViolationFilter,
    ) -> Result<Vec<ViolationRecord>, StoreError>;

    /// `None` when the violation does not exist or is outside `scope`.
    async fn get_violation(
        &self,
        scope: &Scope,
        id: Uuid,
    ) -> Result<Option<ViolationRecord>, StoreError>;

    /// Insert a violation and its creation log row. When `trip_reason` is
    /// given it is written to the trip's `violation_reason` in the same unit
    /// of work.
    async fn create_violation(
        &self,
        violation: &Violation,
        log: &ViolationStatusLog,
        trip_reason: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Apply a status change and append its log row.
    async fn update_violation_status(&self, change: &ViolationChange) -> Result<(), StoreError>;

    /// Audit trail, oldest first.
    async fn violation_history(&self, id: Uuid) -> Result<Vec<ViolationStatusLog>, StoreError>;
}

#[async_trait]
pub trait AppealStore: Send + Sync {
    /// Newest first.
    async fn list_appeals(
        &self,
        scope: &Scope,
        filter: &AppealFilter,
    ) -> Result<Vec<AppealView>, StoreError>;

    async fn get_appeal(&self, scope: &Scope, id: Uuid) -> Result<Option<AppealDetail>, StoreError>;

    /// Every appeal on a violation visible in `scope`, oldest first.
    async fn appeals_for_violation(
        &self,
        scope: &Scope,
        violation_id: Uuid,
    ) -> Result<Vec<AppealDetail>, StoreError>;

    /// Number of SUBMITTED, UNDER_REVIEW or NEED_INFO appeals on a violation.
    async fn count_active(&self, violation_id: Uuid) -> Result<i64, StoreError>;

    /// Latest appeal and flags for each violation id, in one round trip.
    async fn summarize(
        &self,
        violation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AppealSummary>, StoreError>;

    /// Insert the appeal, its attachments, the seed comment and the creation
    /// log row. Fails with [`StoreError::ActiveAppealExists`] if another
    /// active appeal exists for the same violation.
    async fn create_appeal(
        &self,
        appeal: &Appeal,
        opening: &NewComment,
        log: &AppealStatusLog,
    ) -> Result<(), StoreError>;

    /// Insert a comment with its attachments and, when the comment reopens
    /// review, the status change.
    async fn add_comment(
        &self,
        comment: &NewComment,
        reopen: Option<&AppealChange>,
    ) -> Result<(), StoreError>;

    /// Apply a reviewer action: the appeal status change, the optional
    /// reviewer comment, and the optional violation cascade.
    async fn apply_transition(
        &self,
        change: &AppealChange,
        cascade: Option<&ViolationChange>,
        note: Option<&NewComment>,
    ) -> Result<(), StoreError>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Store: Directory + ViolationStore + AppealStore {
    /// Cheap liveness check of the backend.
    async fn ping(&self) -> Result<(), StoreError>;
}
