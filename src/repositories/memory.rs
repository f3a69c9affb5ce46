//! In-memory stores for single-node setups and tests.
//!
//! Each store keeps its rows behind one Tokio mutex so that conditional
//! updates are a single critical section, the same guarantee the Postgres
//! stores get from row locking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::models::entitlement::{effective_access, Entitlement};
use crate::models::otc::{ConsumeOutcome, OneTimeCode};
use crate::repositories::{entitlement::EntitlementStore, otc::OtcStore};

/// Code store keyed by digest.
#[derive(Debug, Clone, Default)]
pub struct MemoryOtcStore {
    codes: Arc<Mutex<HashMap<String, OneTimeCode>>>,
}

impl MemoryOtcStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored codes, consumed and expired included.
    pub async fn len(&self) -> usize {
        self.codes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.codes.lock().await.is_empty()
    }
}

#[async_trait]
impl OtcStore for MemoryOtcStore {
    async fn try_insert(&self, code: &OneTimeCode) -> Result<bool> {
        let mut codes = self.codes.lock().await;
        if codes.contains_key(&code.code_hash) {
            return Ok(false);
        }
        codes.insert(code.code_hash.clone(), code.clone());
        Ok(true)
    }

    async fn record_delivery(&self, id: Uuid, sms_sent: bool, email_sent: bool) -> Result<()> {
        let mut codes = self.codes.lock().await;
        if let Some(code) = codes.values_mut().find(|c| c.id == id) {
            code.sms_sent = sms_sent;
            code.email_sent = email_sent;
        }
        Ok(())
    }

    async fn consume(
        &self,
        code_hash: &str,
        course_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome> {
        let mut codes = self.codes.lock().await;

        match codes.get_mut(code_hash) {
            Some(code) if code.course_id == course_id && !code.consumed && !code.is_expired(now) => {
                code.consumed = true;
                code.consumed_at = Some(now);
                Ok(ConsumeOutcome::Redeemed(code.clone()))
            }
            other => Ok(ConsumeOutcome::classify_unredeemed(other.as_deref(), course_id, now)),
        }
    }

    async fn list_recent(&self, course_id: Option<&str>, limit: i64) -> Result<Vec<OneTimeCode>> {
        let codes = self.codes.lock().await;
        let mut matching: Vec<OneTimeCode> = codes
            .values()
            .filter(|c| course_id.is_none_or(|id| c.course_id == id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }
}

/// Append-only entitlement ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntitlementStore {
    rows: Arc<Mutex<Vec<Entitlement>>>,
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn insert(&self, entitlement: &Entitlement) -> Result<()> {
        self.rows.lock().await.push(entitlement.clone());
        Ok(())
    }

    async fn revoke(
        &self,
        id: Uuid,
        revoked_by: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Entitlement>> {
        let mut rows = self.rows.lock().await;
        Ok(rows.iter_mut().find(|row| row.id == id).map(|row| {
            row.revoke(revoked_by, reason, now);
            row.clone()
        }))
    }

    async fn has_access(&self, user_id: &str, app_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let rows = self.rows.lock().await;
        Ok(effective_access(
            rows.iter().filter(|row| row.user_id == user_id && row.app_id == app_id),
            now,
        ))
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Entitlement>> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<Entitlement> = rows
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
        Ok(matching)
    }
}
