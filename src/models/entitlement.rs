use chrono::{DateTime, Duration, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// Length of a grant, fixed at grant time.
pub const ENTITLEMENT_TERM_DAYS: i64 = 365;

/// The stored status of a grant. Expiry is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "entitlement_status", rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Revoked,
}

/// Where a grant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "entitlement_source", rename_all = "snake_case")]
pub enum EntitlementSource {
    Admin,
    PurchaseWebhook,
}

/// The status as seen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveStatus {
    Active,
    Revoked,
    Expired,
}

/// A paid-access grant for one user and one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: Uuid,
    pub user_id: String,
    pub app_id: String,
    pub status: EntitlementStatus,
    pub source: EntitlementSource,
    /// External payment id, kept for audit only.
    pub payment_reference: Option<String>,
    pub granted_by: String,
    pub purchased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub revoke_reason: Option<String>,
}

/// Input for a new grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntitlement {
    pub user_id: String,
    pub app_id: String,
    pub source: EntitlementSource,
    pub payment_reference: Option<String>,
    pub granted_by: String,
}

impl Entitlement {
    /// Builds an active grant purchased at `now`, valid for one term.
    pub fn grant(new: NewEntitlement, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            app_id: new.app_id,
            status: EntitlementStatus::Active,
            source: new.source,
            payment_reference: new.payment_reference,
            granted_by: new.granted_by,
            purchased_at: now,
            expires_at: now + Duration::days(ENTITLEMENT_TERM_DAYS),
            revoked_at: None,
            revoked_by: None,
            revoke_reason: None,
        }
    }

    /// Whether this row contributes to effective access at `now`.
    pub fn grants_access(&self, now: DateTime<Utc>) -> bool {
        self.status == EntitlementStatus::Active && now <= self.expires_at
    }

    /// Revocation wins over expiry.
    pub fn effective_status(&self, now: DateTime<Utc>) -> EffectiveStatus {
        match self.status {
            EntitlementStatus::Revoked => EffectiveStatus::Revoked,
            EntitlementStatus::Active if now > self.expires_at => EffectiveStatus::Expired,
            EntitlementStatus::Active => EffectiveStatus::Active,
        }
    }

    /// Marks the row revoked. A second revocation keeps the first record.
    pub fn revoke(&mut self, revoked_by: &str, reason: Option<&str>, now: DateTime<Utc>) {
        if self.status == EntitlementStatus::Revoked {
            return;
        }
        self.status = EntitlementStatus::Revoked;
        self.revoked_at = Some(now);
        self.revoked_by = Some(revoked_by.to_string());
        self.revoke_reason = reason.map(str::to_string);
    }
}

impl TryFrom<&Row> for Entitlement {
    type Error = tokio_postgres::Error;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            app_id: row.try_get("app_id")?,
            status: row.try_get("status")?,
            source: row.try_get("source")?,
            payment_reference: row.try_get("payment_reference")?,
            granted_by: row.try_get("granted_by")?,
            purchased_at: row.try_get("purchased_at")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
            revoked_by: row.try_get("revoked_by")?,
            revoke_reason: row.try_get("revoke_reason")?,
        })
    }
}

/// Effective access = OR over rows that are active and unexpired.
pub fn effective_access<'a, I>(rows: I, now: DateTime<Utc>) -> bool
where
    I: IntoIterator<Item = &'a Entitlement>,
{
    rows.into_iter().any(|row| row.grants_access(now))
}
