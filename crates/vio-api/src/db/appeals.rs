//! Appeal persistence: appeals, comments, attachments and the appeal log.
//!
//! Scoped reads join through the appealed violation's trip, so visibility
//! follows the live trip linkage while the appeal keeps its own snapshot of
//! ticket, driver and contractor.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use vio_core::Scope;

use super::violations::{apply_change as apply_violation_change, ViolationRow};
use super::{active_appeal_conflict, decode, push_any_text, push_scope, PgStore};
use crate::model::{
    Appeal, AppealAttachment, AppealComment, AppealDetail, AppealStatusLog, AppealSummary,
    AppealView, DriverBrief,
};
use crate::store::{
    page_limit, page_offset, AppealChange, AppealFilter, AppealStore, NewComment, StoreError,
    ViolationChange,
};

const APPEAL_COLUMNS: &str = "a.id AS appeal_id, a.violation_id, a.trip_id AS appeal_trip_id,
        a.ticket_id, a.driver_id AS appeal_driver_id, a.contractor_id,
        a.reason_code::text AS reason_code, a.reason_text, a.status::text AS appeal_status,
        a.resolved_by, a.resolved_at, a.created_at AS appeal_created_at,
        a.updated_at AS appeal_updated_at";

fn select_view() -> String {
    format!(
        "SELECT {APPEAL_COLUMNS},
            v.id, v.trip_id, v.type, v.detected_by::text AS detected_by,
            v.severity::text AS severity, v.status::text AS status, v.description,
            v.created_at, v.updated_at,
            d.full_name AS driver_name, d.phone AS driver_phone
        FROM violation_appeals a
        JOIN violations v ON v.id = a.violation_id
        JOIN trips t ON t.id = v.trip_id
        LEFT JOIN tickets tk ON tk.id = t.ticket_id
        LEFT JOIN drivers d ON d.id = a.driver_id
        WHERE TRUE"
    )
}

#[derive(sqlx::FromRow)]
struct AppealRow {
    appeal_id: Uuid,
    violation_id: Uuid,
    appeal_trip_id: Uuid,
    ticket_id: Option<Uuid>,
    appeal_driver_id: Option<Uuid>,
    contractor_id: Option<Uuid>,
    reason_code: String,
    reason_text: String,
    appeal_status: String,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    appeal_created_at: DateTime<Utc>,
    appeal_updated_at: DateTime<Utc>,
}

impl AppealRow {
    fn into_appeal(self) -> Result<Appeal, StoreError> {
        Ok(Appeal {
            id: self.appeal_id,
            violation_id: self.violation_id,
            trip_id: self.appeal_trip_id,
            ticket_id: self.ticket_id,
            driver_id: self.appeal_driver_id,
            contractor_id: self.contractor_id,
            reason_code: decode("reason_code", self.reason_code)?,
            reason_text: self.reason_text,
            status: decode("status", self.appeal_status)?,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            created_at: self.appeal_created_at,
            updated_at: self.appeal_updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ViewRow {
    #[sqlx(flatten)]
    appeal: AppealRow,
    #[sqlx(flatten)]
    violation: ViolationRow,
    driver_name: Option<String>,
    driver_phone: Option<String>,
}

impl ViewRow {
    fn into_view(self) -> Result<AppealView, StoreError> {
        let appeal = self.appeal.into_appeal()?;
        let driver = appeal.driver_id.map(|id| DriverBrief {
            id,
            full_name: self.driver_name.unwrap_or_default(),
            phone: self.driver_phone.unwrap_or_default(),
        });
        Ok(AppealView {
            appeal,
            violation: self.violation.into_violation()?,
            driver,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    appeal_id: Uuid,
    author_id: Uuid,
    author_role: String,
    message: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    appeal_id: Uuid,
    file_url: String,
    file_type: String,
    uploaded_by: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: Uuid,
    appeal_id: Uuid,
    old_status: Option<String>,
    new_status: String,
    note: Option<String>,
    changed_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

/// Comments, attachments and history for a batch of appeals.
#[derive(Default)]
struct Children {
    comments: HashMap<Uuid, Vec<AppealComment>>,
    attachments: HashMap<Uuid, Vec<AppealAttachment>>,
    history: HashMap<Uuid, Vec<AppealStatusLog>>,
}

impl Children {
    fn detail(&mut self, view: AppealView) -> AppealDetail {
        let id = view.appeal.id;
        AppealDetail {
            appeal: view.appeal,
            violation: view.violation,
            driver: view.driver,
            comments: self.comments.remove(&id).unwrap_or_default(),
            attachments: self.attachments.remove(&id).unwrap_or_default(),
            history: self.history.remove(&id).unwrap_or_default(),
        }
    }
}

impl PgStore {
    async fn load_children(&self, appeal_ids: &[Uuid]) -> Result<Children, StoreError> {
        let mut children = Children::default();
        if appeal_ids.is_empty() {
            return Ok(children);
        }
        let ids = appeal_ids.to_vec();

        let comments = sqlx::query_as::<_, CommentRow>(
            "SELECT id, appeal_id, author_id, author_role, message, created_at
             FROM violation_appeal_comments
             WHERE appeal_id = ANY($1)
             ORDER BY created_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in comments {
            children
                .comments
                .entry(row.appeal_id)
                .or_default()
                .push(AppealComment {
                    id: row.id,
                    appeal_id: row.appeal_id,
                    author_id: row.author_id,
                    author_role: decode("author_role", row.author_role)?,
                    message: row.message,
                    created_at: row.created_at,
                });
        }

        let attachments = sqlx::query_as::<_, AttachmentRow>(
            "SELECT id, appeal_id, file_url, file_type::text AS file_type, uploaded_by, created_at
             FROM violation_appeal_attachments
             WHERE appeal_id = ANY($1)
             ORDER BY created_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in attachments {
            children
                .attachments
                .entry(row.appeal_id)
                .or_default()
                .push(AppealAttachment {
                    id: row.id,
                    appeal_id: row.appeal_id,
                    file_url: row.file_url,
                    file_type: decode("file_type", row.file_type)?,
                    uploaded_by: row.uploaded_by,
                    created_at: row.created_at,
                });
        }

        let history = sqlx::query_as::<_, LogRow>(
            "SELECT id, appeal_id, old_status::text AS old_status,
                    new_status::text AS new_status, note, changed_by, created_at
             FROM appeal_status_log
             WHERE appeal_id = ANY($1)
             ORDER BY created_at ASC",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        for row in history {
            children
                .history
                .entry(row.appeal_id)
                .or_default()
                .push(AppealStatusLog {
                    id: row.id,
                    appeal_id: row.appeal_id,
                    old_status: row
                        .old_status
                        .map(|s| decode("old_status", s))
                        .transpose()?,
                    new_status: decode("new_status", row.new_status)?,
                    note: row.note,
                    changed_by: row.changed_by,
                    created_at: row.created_at,
                });
        }

        Ok(children)
    }

    async fn details(&self, views: Vec<AppealView>) -> Result<Vec<AppealDetail>, StoreError> {
        let ids: Vec<Uuid> = views.iter().map(|v| v.appeal.id).collect();
        let mut children = self.load_children(&ids).await?;
        Ok(views.into_iter().map(|v| children.detail(v)).collect())
    }
}

async fn insert_comment(conn: &mut PgConnection, new: &NewComment) -> Result<(), StoreError> {
    let comment = &new.comment;
    sqlx::query(
        "INSERT INTO violation_appeal_comments
            (id, appeal_id, author_id, author_role, message, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(comment.id)
    .bind(comment.appeal_id)
    .bind(comment.author_id)
    .bind(comment.author_role.as_str())
    .bind(&comment.message)
    .bind(comment.created_at)
    .execute(&mut *conn)
    .await?;

    for attachment in &new.attachments {
        sqlx::query(
            "INSERT INTO violation_appeal_attachments
                (id, appeal_id, file_url, file_type, uploaded_by, created_at)
             VALUES ($1, $2, $3, $4::attachment_file_type, $5, $6)",
        )
        .bind(attachment.id)
        .bind(attachment.appeal_id)
        .bind(&attachment.file_url)
        .bind(attachment.file_type.as_str())
        .bind(attachment.uploaded_by)
        .bind(attachment.created_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn insert_log(conn: &mut PgConnection, log: &AppealStatusLog) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO appeal_status_log
            (id, appeal_id, old_status, new_status, note, changed_by, created_at)
         VALUES ($1, $2, $3::appeal_status, $4::appeal_status, $5, $6, $7)",
    )
    .bind(log.id)
    .bind(log.appeal_id)
    .bind(log.old_status.map(|s| s.as_str()))
    .bind(log.new_status.as_str())
    .bind(&log.note)
    .bind(log.changed_by)
    .bind(log.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Apply an appeal status change guarded by the expected current status.
async fn apply_change(conn: &mut PgConnection, change: &AppealChange) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE violation_appeals
         SET status = $1::appeal_status, resolved_by = $2, resolved_at = $3, updated_at = $4
         WHERE id = $5 AND status = $6::appeal_status",
    )
    .bind(change.to.as_str())
    .bind(change.resolved_by)
    .bind(change.resolved_at)
    .bind(change.log.created_at)
    .bind(change.appeal_id)
    .bind(change.from.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::StaleStatus {
            entity: "appeal",
            id: change.appeal_id,
            expected: change.from.to_string(),
        });
    }

    insert_log(conn, &change.log).await
}

#[async_trait]
impl AppealStore for PgStore {
    async fn list_appeals(
        &self,
        scope: &Scope,
        filter: &AppealFilter,
    ) -> Result<Vec<AppealView>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(select_view());
        push_scope(&mut qb, scope);

        push_any_text(&mut qb, "a.status::text", &filter.statuses);
        push_any_text(&mut qb, "a.reason_code::text", &filter.reason_codes);
        push_any_text(&mut qb, "v.type", &filter.violation_types);
        if !filter.contractor_ids.is_empty() {
            qb.push(" AND tk.contractor_id = ANY(")
                .push_bind(filter.contractor_ids.clone())
                .push(")");
        }
        if let Some(driver_id) = filter.driver_id {
            qb.push(" AND t.driver_id = ").push_bind(driver_id);
        }
        if let Some(violation_id) = filter.violation_id {
            qb.push(" AND a.violation_id = ").push_bind(violation_id);
        }
        if let Some(from) = filter.date_from {
            qb.push(" AND a.created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.date_to {
            qb.push(" AND a.created_at <= ").push_bind(to);
        }
        qb.push(" ORDER BY a.created_at DESC LIMIT ")
            .push_bind(page_limit(filter.limit))
            .push(" OFFSET ")
            .push_bind(page_offset(filter.offset));

        let rows = qb.build_query_as::<ViewRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(ViewRow::into_view).collect()
    }

    async fn get_appeal(&self, scope: &Scope, id: Uuid) -> Result<Option<AppealDetail>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(select_view());
        qb.push(" AND a.id = ").push_bind(id);
        push_scope(&mut qb, scope);

        let Some(row) = qb
            .build_query_as::<ViewRow>()
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let mut details = self.details(vec![row.into_view()?]).await?;
        Ok(details.pop())
    }

    async fn appeals_for_violation(
        &self,
        scope: &Scope,
        violation_id: Uuid,
    ) -> Result<Vec<AppealDetail>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(select_view());
        qb.push(" AND a.violation_id = ").push_bind(violation_id);
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY a.created_at ASC");

        let rows = qb.build_query_as::<ViewRow>().fetch_all(&self.pool).await?;
        let views = rows
            .into_iter()
            .map(ViewRow::into_view)
            .collect::<Result<Vec<_>, _>>()?;
        self.details(views).await
    }

    async fn count_active(&self, violation_id: Uuid) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM violation_appeals
             WHERE violation_id = $1 AND status IN ('SUBMITTED', 'UNDER_REVIEW', 'NEED_INFO')",
        )
        .bind(violation_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn summarize(
        &self,
        violation_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AppealSummary>, StoreError> {
        let mut summaries: HashMap<Uuid, AppealSummary> = HashMap::new();
        if violation_ids.is_empty() {
            return Ok(summaries);
        }
        let query = format!(
            "SELECT {APPEAL_COLUMNS} FROM violation_appeals a
             WHERE a.violation_id = ANY($1)
             ORDER BY a.violation_id, a.created_at DESC"
        );
        let rows = sqlx::query_as::<_, AppealRow>(&query)
            .bind(violation_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let appeal = row.into_appeal()?;
            summaries
                .entry(appeal.violation_id)
                .or_default()
                .absorb(&appeal);
        }
        Ok(summaries)
    }

    async fn create_appeal(
        &self,
        appeal: &Appeal,
        opening: &NewComment,
        log: &AppealStatusLog,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO violation_appeals
                (id, violation_id, trip_id, ticket_id, driver_id, contractor_id,
                 reason_code, reason_text, status, resolved_by, resolved_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7::appeal_reason_code, $8, $9::appeal_status,
                     $10, $11, $12, $13)",
        )
        .bind(appeal.id)
        .bind(appeal.violation_id)
        .bind(appeal.trip_id)
        .bind(appeal.ticket_id)
        .bind(appeal.driver_id)
        .bind(appeal.contractor_id)
        .bind(appeal.reason_code.as_str())
        .bind(&appeal.reason_text)
        .bind(appeal.status.as_str())
        .bind(appeal.resolved_by)
        .bind(appeal.resolved_at)
        .bind(appeal.created_at)
        .bind(appeal.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| active_appeal_conflict(e, appeal.violation_id))?;

        insert_comment(&mut tx, opening).await?;
        insert_log(&mut tx, log).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_comment(
        &self,
        comment: &NewComment,
        reopen: Option<&AppealChange>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_comment(&mut tx, comment).await?;
        if let Some(change) = reopen {
            apply_change(&mut tx, change).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply_transition(
        &self,
        change: &AppealChange,
        cascade: Option<&ViolationChange>,
        note: Option<&NewComment>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        apply_change(&mut tx, change).await?;
        if let Some(note) = note {
            insert_comment(&mut tx, note).await?;
        }
        if let Some(cascade) = cascade {
            apply_violation_change(&mut tx, cascade).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
