//! Read-only lookups against the dispatch system's tables.

use async_trait::async_trait;
use uuid::Uuid;

use super::PgStore;
use crate::model::TripLink;
use crate::store::{Directory, StoreError};

#[derive(sqlx::FromRow)]
struct TripLinkRow {
    trip_id: Uuid,
    ticket_id: Option<Uuid>,
    contractor_id: Option<Uuid>,
    driver_id: Option<Uuid>,
}

#[async_trait]
impl Directory for PgStore {
    async fn child_contractors(&self, org_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM organizations
             WHERE parent_org_id = $1 AND type::text = 'CONTRACTOR' AND is_active = TRUE
             ORDER BY id",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn trip_link(&self, trip_id: Uuid) -> Result<Option<TripLink>, StoreError> {
        let row = sqlx::query_as::<_, TripLinkRow>(
            "SELECT t.id AS trip_id, t.ticket_id, tk.contractor_id, t.driver_id
             FROM trips t
             LEFT JOIN tickets tk ON tk.id = t.ticket_id
             WHERE t.id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| TripLink {
            trip_id: r.trip_id,
            ticket_id: r.ticket_id,
            contractor_id: r.contractor_id,
            driver_id: r.driver_id,
        }))
    }
}
