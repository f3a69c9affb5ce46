use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::entitlement::{Entitlement, EntitlementStatus},
};

/// Persistence for entitlement rows.
///
/// Rows are never deleted. `has_access` must read current state on every
/// call; implementations may not cache it.
#[async_trait]
pub trait EntitlementStore: Send + Sync + 'static {
    /// Appends a row.
    async fn insert(&self, entitlement: &Entitlement) -> Result<()>;

    /// Revokes one row, returning it, or `None` if the id is unknown.
    async fn revoke(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Entitlement>>;

    /// Whether any row for the pair is active and unexpired at `now`.
    async fn has_access(&self, user_id: &str, app_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// All rows for a user, newest purchase first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Entitlement>>;
}

const ENTITLEMENT_COLUMNS: &str = "id, user_id, app_id, status, source, payment_reference, \
     granted_by, purchased_at, expires_at, revoked_at, revoked_by, revoke_reason";

/// Postgres-backed ledger.
#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: Pool,
}

impl PgEntitlementStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn insert(&self, entitlement: &Entitlement) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO entitlements (
                    id, user_id, app_id, status, source, payment_reference,
                    granted_by, purchased_at, expires_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
                &[
                    &entitlement.id,
                    &entitlement.user_id,
                    &entitlement.app_id,
                    &entitlement.status,
                    &entitlement.source,
                    &entitlement.payment_reference,
                    &entitlement.granted_by,
                    &entitlement.purchased_at,
                    &entitlement.expires_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn revoke(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Entitlement>> {
        let client = self.pool.get().await?;

        // Already-revoked rows keep their original revocation record.
        let row = client
            .query_opt(
                &*format!(
                    r#"
                    UPDATE entitlements
                    SET status = $2,
                        revoked_at = COALESCE(revoked_at, $3),
                        revoked_by = COALESCE(revoked_by, $4),
                        revoke_reason = CASE WHEN revoked_at IS NULL THEN $5 ELSE revoke_reason END
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    ENTITLEMENT_COLUMNS
                ),
                &[&id, &EntitlementStatus::Revoked, &now, &revoked_by, &reason],
            )
            .await?;

        row.map(|r| Entitlement::try_from(&r).map_err(Into::into))
            .transpose()
    }

    async fn has_access(&self, user_id: &str, app_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM entitlements
                    WHERE user_id = $1
                      AND app_id = $2
                      AND status = $3
                      AND expires_at >= $4
                ) AS has_access
                "#,
                &[&user_id, &app_id, &EntitlementStatus::Active, &now],
            )
            .await?;
        Ok(row.try_get("has_access")?)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Entitlement>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &*format!(
                    r#"
                    SELECT {}
                    FROM entitlements
                    WHERE user_id = $1
                    ORDER BY purchased_at DESC
                    "#,
                    ENTITLEMENT_COLUMNS
                ),
                &[&user_id],
            )
            .await?;

        rows.iter()
            .map(|row| Entitlement::try_from(row).map_err(Into::into))
            .collect()
    }
}
