use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::entitlement::{Entitlement, EntitlementSource, NewEntitlement},
    state::AppState,
};

/// Longest accepted user id or payment reference.
const MAX_REFERENCE_LEN: usize = 200;

/// Grants `app_id` to `user_id` for one term starting now.
///
/// Grants are never merged: a second grant for the same pair adds a row.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `new` - The grant to record.
///
/// # Returns
///
/// A `Result` containing the stored `Entitlement`.
pub async fn grant(state: &AppState, new: NewEntitlement) -> Result<Entitlement> {
    grant_at(state, new, Utc::now()).await
}

/// [`grant`] with an explicit purchase time.
pub async fn grant_at(
    state: &AppState,
    new: NewEntitlement,
    now: DateTime<Utc>,
) -> Result<Entitlement> {
    let user_id = new.user_id.trim().to_string();
    if user_id.is_empty() || user_id.len() > MAX_REFERENCE_LEN {
        return Err(AppError::Validation(
            "User id must be between 1 and 200 characters".to_string(),
        ));
    }
    let app = state.catalog.require(new.app_id.trim())?;

    let payment_reference = new
        .payment_reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    if payment_reference.as_ref().is_some_and(|r| r.len() > MAX_REFERENCE_LEN) {
        return Err(AppError::Validation(
            "Payment reference cannot exceed 200 characters".to_string(),
        ));
    }
    if new.source == EntitlementSource::PurchaseWebhook && payment_reference.is_none() {
        return Err(AppError::Validation(
            "Purchases must carry a payment reference".to_string(),
        ));
    }

    let entitlement = Entitlement::grant(
        NewEntitlement {
            user_id,
            app_id: app.id.clone(),
            source: new.source,
            payment_reference,
            granted_by: new.granted_by,
        },
        now,
    );

    state.entitlements.insert(&entitlement).await?;

    tracing::info!(
        entitlement_id = %entitlement.id,
        user_id = %entitlement.user_id,
        app_id = %entitlement.app_id,
        source = ?entitlement.source,
        granted_by = %entitlement.granted_by,
        "✅ Entitlement granted"
    );

    Ok(entitlement)
}

/// Revokes an entitlement. Revoking a revoked row changes nothing.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `id` - The entitlement to revoke.
/// * `revoked_by` - Audit label of the acting admin.
/// * `reason` - Optional free-text reason.
///
/// # Returns
///
/// A `Result` containing the row after revocation.
pub async fn revoke(
    state: &AppState,
    id: Uuid,
    revoked_by: &str,
    reason: Option<&str>,
) -> Result<Entitlement> {
    revoke_at(state, id, revoked_by, reason, Utc::now()).await
}

/// [`revoke`] at an explicit instant.
pub async fn revoke_at(
    state: &AppState,
    id: Uuid,
    revoked_by: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Entitlement> {
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());

    let entitlement = state
        .entitlements
        .revoke(id, revoked_by, reason, now)
        .await?
        .ok_or(AppError::EntitlementNotFound)?;

    tracing::info!(
        entitlement_id = %entitlement.id,
        user_id = %entitlement.user_id,
        app_id = %entitlement.app_id,
        revoked_by = ?entitlement.revoked_by,
        reason = ?entitlement.revoke_reason,
        "Entitlement revoked"
    );

    Ok(entitlement)
}

/// Whether the user can use the app right now. Always read from the store.
pub async fn has_access(state: &AppState, user_id: &str, app_id: &str) -> Result<bool> {
    state.entitlements.has_access(user_id, app_id, Utc::now()).await
}

/// All entitlements of a user, newest purchase first.
pub async fn list(state: &AppState, user_id: &str) -> Result<Vec<Entitlement>> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("User id cannot be empty".to_string()));
    }
    state.entitlements.list_for_user(user_id).await
}
