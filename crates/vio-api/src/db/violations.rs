//! Violation persistence.
//!
//! Reads join the trip context in one query; writes run in a transaction
//! and append to `violation_status_log` in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use vio_core::Scope;

use super::{decode, push_any_text, push_scope, push_search, PgStore};
use crate::model::{
    AreaBrief, DriverBrief, OrgBrief, TicketBrief, VehicleBrief, Violation, ViolationRecord,
    ViolationStatusLog,
};
use crate::store::{
    page_limit, page_offset, StoreError, ViolationChange, ViolationFilter, ViolationStore,
};

const SELECT_RECORD: &str = "SELECT v.id, v.trip_id, v.type, v.detected_by::text AS detected_by,
        v.severity::text AS severity, v.status::text AS status, v.description,
        v.created_at, v.updated_at,
        t.status::text AS trip_status, t.entry_at AS trip_entry_at,
        t.violation_reason AS trip_violation_reason,
        tk.id AS ticket_id, tk.status::text AS ticket_status,
        tk.planned_start_at, tk.planned_end_at,
        tk.contractor_id, o.name AS contractor_name,
        t.driver_id, d.full_name AS driver_name, d.phone AS driver_phone,
        t.vehicle_id, vh.plate_number, vh.brand, vh.model,
        tk.cleaning_area_id, ca.name AS area_name,
        p.name AS polygon_name
    FROM violations v
    JOIN trips t ON t.id = v.trip_id
    LEFT JOIN tickets tk ON tk.id = t.ticket_id
    LEFT JOIN organizations o ON o.id = tk.contractor_id
    LEFT JOIN drivers d ON d.id = t.driver_id
    LEFT JOIN vehicles vh ON vh.id = t.vehicle_id
    LEFT JOIN cleaning_areas ca ON ca.id = tk.cleaning_area_id
    LEFT JOIN polygons p ON p.id = t.polygon_id
    WHERE TRUE";

/// Violation columns decoded from text.
#[derive(sqlx::FromRow)]
pub(crate) struct ViolationRow {
    id: Uuid,
    trip_id: Uuid,
    #[sqlx(rename = "type")]
    violation_type: String,
    detected_by: String,
    severity: String,
    status: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ViolationRow {
    pub(crate) fn into_violation(self) -> Result<Violation, StoreError> {
        Ok(Violation {
            id: self.id,
            trip_id: self.trip_id,
            violation_type: decode("type", self.violation_type)?,
            detected_by: decode("detected_by", self.detected_by)?,
            severity: decode("severity", self.severity)?,
            status: decode("status", self.status)?,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    #[sqlx(flatten)]
    violation: ViolationRow,
    trip_status: Option<String>,
    trip_entry_at: Option<DateTime<Utc>>,
    trip_violation_reason: Option<String>,
    ticket_id: Option<Uuid>,
    ticket_status: Option<String>,
    planned_start_at: Option<DateTime<Utc>>,
    planned_end_at: Option<DateTime<Utc>>,
    contractor_id: Option<Uuid>,
    contractor_name: Option<String>,
    driver_id: Option<Uuid>,
    driver_name: Option<String>,
    driver_phone: Option<String>,
    vehicle_id: Option<Uuid>,
    plate_number: Option<String>,
    brand: Option<String>,
    model: Option<String>,
    cleaning_area_id: Option<Uuid>,
    area_name: Option<String>,
    polygon_name: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> Result<ViolationRecord, StoreError> {
        Ok(ViolationRecord {
            violation: self.violation.into_violation()?,
            trip_status: self.trip_status,
            trip_entry_at: self.trip_entry_at,
            trip_violation_reason: self.trip_violation_reason,
            contractor: self.contractor_id.map(|id| OrgBrief {
                id,
                name: self.contractor_name.unwrap_or_default(),
            }),
            ticket: self.ticket_id.map(|id| TicketBrief {
                id,
                status: self.ticket_status.unwrap_or_default(),
                planned_start_at: self.planned_start_at,
                planned_end_at: self.planned_end_at,
            }),
            driver: self.driver_id.map(|id| DriverBrief {
                id,
                full_name: self.driver_name.unwrap_or_default(),
                phone: self.driver_phone.unwrap_or_default(),
            }),
            vehicle: self.vehicle_id.map(|id| VehicleBrief {
                id,
                plate_number: self.plate_number.unwrap_or_default(),
                brand: self.brand.unwrap_or_default(),
                model: self.model.unwrap_or_default(),
            }),
            area: self.cleaning_area_id.map(|id| AreaBrief {
                id,
                name: self.area_name.unwrap_or_default(),
            }),
            polygon_name: self.polygon_name,
            last_appeal: None,
            has_active_appeal: false,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    violation_id: Uuid,
    old_status: Option<String>,
    new_status: String,
    note: Option<String>,
    changed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl LogRow {
    fn into_log(self) -> Result<ViolationStatusLog, StoreError> {
        Ok(ViolationStatusLog {
            id: self.id,
            violation_id: self.violation_id,
            old_status: self
                .old_status
                .map(|s| decode("old_status", s))
                .transpose()?,
            new_status: decode("new_status", self.new_status)?,
            note: self.note,
            changed_by: self.changed_by,
            created_at: self.created_at,
        })
    }
}

pub(crate) async fn insert_log(
    conn: &mut PgConnection,
    log: &ViolationStatusLog,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO violation_status_log
            (id, violation_id, old_status, new_status, note, changed_by, created_at)
         VALUES ($1, $2, $3::violation_status, $4::violation_status, $5, $6, $7)",
    )
    .bind(log.id)
    .bind(log.violation_id)
    .bind(log.old_status.map(|s| s.as_str()))
    .bind(log.new_status.as_str())
    .bind(&log.note)
    .bind(log.changed_by)
    .bind(log.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Apply a status change guarded by the expected current status, then log it.
pub(crate) async fn apply_change(
    conn: &mut PgConnection,
    change: &ViolationChange,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE violations
         SET status = $1::violation_status,
             description = COALESCE($2, description),
             updated_at = $3
         WHERE id = $4 AND status = $5::violation_status",
    )
    .bind(change.to.as_str())
    .bind(&change.description)
    .bind(change.log.created_at)
    .bind(change.violation_id)
    .bind(change.from.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::StaleStatus {
            entity: "violation",
            id: change.violation_id,
            expected: change.from.to_string(),
        });
    }

    insert_log(conn, &change.log).await
}

#[async_trait]
impl ViolationStore for PgStore {
    async fn list_violations(
        &self,
        scope: &Scope,
        filter: &ViolationFilter,
    ) -> Result<Vec<ViolationRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_RECORD);
        push_scope(&mut qb, scope);

        push_any_text(&mut qb, "v.status::text", &filter.statuses);
        push_any_text(&mut qb, "v.type", &filter.types);
        push_any_text(&mut qb, "v.severity::text", &filter.severities);
        push_any_text(&mut qb, "v.detected_by::text", &filter.detected_by);
        if !filter.contractor_ids.is_empty() {
            qb.push(" AND tk.contractor_id = ANY(")
                .push_bind(filter.contractor_ids.clone())
                .push(")");
        }
        if let Some(driver_id) = filter.driver_id {
            qb.push(" AND t.driver_id = ").push_bind(driver_id);
        }
        if let Some(ticket_id) = filter.ticket_id {
            qb.push(" AND tk.id = ").push_bind(ticket_id);
        }
        if let Some(area_id) = filter.cleaning_area_id {
            qb.push(" AND tk.cleaning_area_id = ").push_bind(area_id);
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND COALESCE(t.entry_at, v.created_at) >= ")
                .push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND COALESCE(t.entry_at, v.created_at) <= ")
                .push_bind(to);
        }
        if let Some(term) = &filter.search {
            push_search(&mut qb, term);
        }

        qb.push(" ORDER BY v.created_at DESC LIMIT ")
            .push_bind(page_limit(filter.limit))
            .push(" OFFSET ")
            .push_bind(page_offset(filter.offset));

        let rows = qb
            .build_query_as::<RecordRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn get_violation(
        &self,
        scope: &Scope,
        id: Uuid,
    ) -> Result<Option<ViolationRecord>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_RECORD);
        qb.push(" AND v.id = ").push_bind(id);
        push_scope(&mut qb, scope);

        let row = qb
            .build_query_as::<RecordRow>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(RecordRow::into_record).transpose()
    }

    async fn create_violation(
        &self,
        violation: &Violation,
        log: &ViolationStatusLog,
        trip_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO violations
                (id, trip_id, type, detected_by, severity, status, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4::violation_detected_by, $5::violation_severity,
                     $6::violation_status, $7, $8, $9)",
        )
        .bind(violation.id)
        .bind(violation.trip_id)
        .bind(violation.violation_type.as_str())
        .bind(violation.detected_by.as_str())
        .bind(violation.severity.as_str())
        .bind(violation.status.as_str())
        .bind(&violation.description)
        .bind(violation.created_at)
        .bind(violation.updated_at)
        .execute(&mut *tx)
        .await?;

        if let Some(reason) = trip_reason {
            sqlx::query("UPDATE trips SET violation_reason = $1 WHERE id = $2")
                .bind(reason)
                .bind(violation.trip_id)
                .execute(&mut *tx)
                .await?;
        }

        insert_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_violation_status(&self, change: &ViolationChange) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        apply_change(&mut tx, change).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn violation_history(&self, id: Uuid) -> Result<Vec<ViolationStatusLog>, StoreError> {
        let rows = sqlx::query_as::<_, LogRow>(
            "SELECT id, violation_id, old_status::text AS old_status,
                    new_status::text AS new_status, note, changed_by, created_at
             FROM violation_status_log
             WHERE violation_id = $1
             ORDER BY created_at ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LogRow::into_log).collect()
    }
}
