//! # Database Persistence Layer
//!
//! Postgres implementation of the storage traits via SQLx.
//!
//! ## Tables
//!
//! This service owns `violations`, `violation_appeals`, the appeal comment
//! and attachment tables, and both status logs (see `migrations/`). It reads
//! `trips`, `tickets`, `organizations`, `drivers`, `vehicles`,
//! `cleaning_areas` and `polygons`, which belong to the dispatch system.
//!
//! ## Scope filtering
//!
//! Every scoped query joins `violations v → trips t → tickets tk` and passes
//! through [`push_scope`] before any caller filter is added. Enum columns are
//! compared as text so that filters bind plain string arrays.

mod appeals;
mod directory;
mod violations;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use vio_core::{Scope, TECHNICAL_DETECTIONS};

use crate::config::AppConfig;
use crate::store::{Store, StoreError};

/// Name of the partial unique index guarding the single active appeal.
const ACTIVE_APPEAL_INDEX: &str = "uniq_violation_active_appeal";

/// Connect to Postgres and run embedded migrations.
///
/// Returns `None` when `DB_DSN` is not configured (in-memory mode).
pub async fn init_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(dsn) = config.db_dsn.as_deref() else {
        tracing::warn!("DB_DSN not set, running on the in-memory store; data will not survive restarts");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_open_conns)
        .min_connections(config.db_max_idle_conns)
        .max_lifetime(Duration::from_secs(config.db_conn_max_lifetime_secs))
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// [`Store`] over a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Append the scope restriction to a query whose FROM clause exposes the
/// `v`, `t` and `tk` aliases. An empty scope appends `AND FALSE`.
pub(crate) fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: &Scope) {
    match scope {
        Scope::City => {}
        Scope::Oversight { contractor_ids, .. } => {
            if contractor_ids.is_empty() {
                qb.push(" AND FALSE");
            } else {
                qb.push(" AND tk.contractor_id = ANY(")
                    .push_bind(contractor_ids.clone())
                    .push(")");
            }
        }
        Scope::Contractor { org_id } => {
            qb.push(" AND tk.contractor_id = ").push_bind(*org_id);
        }
        Scope::Driver { driver_id } => match driver_id {
            Some(driver_id) => {
                qb.push(" AND t.driver_id = ").push_bind(*driver_id);
            }
            None => {
                qb.push(" AND FALSE");
            }
        },
        Scope::Technical => {
            let detections: Vec<String> = TECHNICAL_DETECTIONS
                .iter()
                .map(|d| d.as_str().to_string())
                .collect();
            qb.push(" AND v.detected_by::text = ANY(")
                .push_bind(detections)
                .push(")");
        }
    }
}

/// Append `AND <column> = ANY($n)` when `values` is non-empty.
pub(crate) fn push_any_text<T: std::fmt::Display>(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    values: &[T],
) {
    if values.is_empty() {
        return;
    }
    let values: Vec<String> = values.iter().map(ToString::to_string).collect();
    qb.push(" AND ")
        .push(column)
        .push(" = ANY(")
        .push_bind(values)
        .push(")");
}

/// Append a case-insensitive substring match over driver name or vehicle
/// plate. LIKE wildcards in `term` match literally.
pub(crate) fn push_search(qb: &mut QueryBuilder<'_, Postgres>, term: &str) {
    let pattern = format!("%{}%", escape_like(term));
    qb.push(" AND (d.full_name ILIKE ")
        .push_bind(pattern.clone())
        .push(" ESCAPE '\\' OR vh.plate_number ILIKE ")
        .push_bind(pattern)
        .push(" ESCAPE '\\')");
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Decode a text column into a closed vocabulary.
pub(crate) fn decode<T: FromStr>(column: &'static str, value: String) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt { column, value })
}

/// Map an insert failure on `violation_appeals` to the domain conflict when
/// the active-appeal index rejected it.
pub(crate) fn active_appeal_conflict(err: sqlx::Error, violation_id: uuid::Uuid) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.constraint() == Some(ACTIVE_APPEAL_INDEX) {
            return StoreError::ActiveAppealExists { violation_id };
        }
    }
    StoreError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn render(scope: &Scope) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_scope(&mut qb, scope);
        qb.sql().to_string()
    }

    #[test]
    fn city_scope_adds_nothing() {
        assert_eq!(render(&Scope::City), "SELECT 1 WHERE TRUE");
    }

    #[test]
    fn empty_scopes_deny_everything() {
        let oversight = Scope::Oversight {
            org_id: Uuid::new_v4(),
            contractor_ids: Vec::new(),
        };
        assert!(render(&oversight).ends_with("AND FALSE"));
        assert!(render(&Scope::Driver { driver_id: None }).ends_with("AND FALSE"));
    }

    #[test]
    fn scoped_queries_bind_parameters() {
        let contractor = render(&Scope::Contractor { org_id: Uuid::new_v4() });
        assert!(contractor.contains("tk.contractor_id = $1"));
        let driver = render(&Scope::Driver {
            driver_id: Some(Uuid::new_v4()),
        });
        assert!(driver.contains("t.driver_id = $1"));
        let technical = render(&Scope::Technical);
        assert!(technical.contains("v.detected_by::text = ANY($1)"));
    }

    #[test]
    fn any_text_skips_empty_filters() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_any_text::<String>(&mut qb, "v.status::text", &[]);
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
        push_any_text(&mut qb, "v.status::text", &["OPEN"]);
        assert!(qb.sql().ends_with("v.status::text = ANY($1)"));
    }

    #[test]
    fn search_escapes_like_wildcards() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
        assert_eq!(escape_like("KAZ 123"), "KAZ 123");

        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_search(&mut qb, "_");
        assert_eq!(
            qb.sql(),
            "SELECT 1 WHERE TRUE AND (d.full_name ILIKE $1 ESCAPE '\\' \
             OR vh.plate_number ILIKE $2 ESCAPE '\\')"
        );
    }

    #[test]
    fn decode_reports_corrupt_values() {
        let err = decode::<vio_core::Severity>("severity", "EXTREME".into()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { column: "severity", .. }));
    }
}
