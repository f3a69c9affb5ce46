use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::otc::{ConsumeOutcome, OneTimeCode},
};

/// Persistence for one-time codes.
///
/// `consume` must be atomic: among concurrent calls for the same code at
/// most one may return `Redeemed`.
#[async_trait]
pub trait OtcStore: Send + Sync + 'static {
    /// Inserts a new record. Returns `false` if its digest is already taken.
    async fn try_insert(&self, code: &OneTimeCode) -> Result<bool>;

    /// Records which delivery attempts succeeded.
    async fn record_delivery(&self, id: Uuid, sms_sent: bool, email_sent: bool) -> Result<()>;

    /// Redeems the code if it matches the course, is unexpired and unused.
    async fn consume(
        &self,
        code_hash: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome>;

    /// Most recently issued codes first, optionally for one course.
    async fn list_recent(&self, course_id: Option<&str>, limit: i64) -> Result<Vec<OneTimeCode>>;
}

const OTC_COLUMNS: &str = "id, code_hash, course_id, recipient_name, phone, email, reason, \
     issued_by, issued_at, expires_at, consumed, consumed_at, sms_sent, email_sent";

/// Postgres-backed code store.
#[derive(Clone)]
pub struct PgOtcStore {
    pool: Pool,
}

impl PgOtcStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtcStore for PgOtcStore {
    async fn try_insert(&self, code: &OneTimeCode) -> Result<bool> {
        let client = self.pool.get().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO one_time_codes (
                    id, code_hash, course_id, recipient_name, phone, email, reason,
                    issued_by, issued_at, expires_at, consumed, sms_sent, email_sent
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, false, false, false)
                ON CONFLICT (code_hash) DO NOTHING
                "#,
                &[
                    &code.id,
                    &code.code_hash,
                    &code.course_id,
                    &code.recipient_name,
                    &code.phone,
                    &code.email,
                    &code.reason,
                    &code.issued_by,
                    &code.issued_at,
                    &code.expires_at,
                ],
            )
            .await?;
        Ok(inserted == 1)
    }

    async fn record_delivery(&self, id: Uuid, sms_sent: bool, email_sent: bool) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE one_time_codes
                SET sms_sent = $2, email_sent = $3
                WHERE id = $1
                "#,
                &[&id, &sms_sent, &email_sent],
            )
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        code_hash: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let client = self.pool.get().await?;

        // Single conditional write; the row lock serializes racing redeemers.
        let redeemed = client
            .query_opt(
                &*format!(
                    r#"
                    UPDATE one_time_codes
                    SET consumed = true, consumed_at = $3
                    WHERE code_hash = $1
                      AND course_id = $2
                      AND consumed = false
                      AND expires_at > $3
                    RETURNING {}
                    "#,
                    OTC_COLUMNS
                ),
                &[&code_hash, &course_id, &now],
            )
            .await?;

        if let Some(row) = redeemed {
            return Ok(ConsumeOutcome::Redeemed(OneTimeCode::try_from(&row)?));
        }

        let existing = client
            .query_opt(
                &*format!("SELECT {} FROM one_time_codes WHERE code_hash = $1", OTC_COLUMNS),
                &[&code_hash],
            )
            .await?
            .map(|row| OneTimeCode::try_from(&row))
            .transpose()?;

        Ok(ConsumeOutcome::classify_unredeemed(existing.as_ref(), course_id, now))
    }

    async fn list_recent(&self, course_id: Option<&str>, limit: i64) -> Result<Vec<OneTimeCode>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &*format!(
                    r#"
                    SELECT {}
                    FROM one_time_codes
                    WHERE ($1::text IS NULL OR course_id = $1)
                    ORDER BY issued_at DESC
                    LIMIT $2
                    "#,
                    OTC_COLUMNS
                ),
                &[&course_id, &limit],
            )
            .await?;

        rows.iter()
            .map(|row| OneTimeCode::try_from(row).map_err(Into::into))
            .collect()
    }
}
