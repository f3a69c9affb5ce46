use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::{
    error::{AppError, Result},
    handlers::response::{invalid, json_response},
    models::entitlement::{EntitlementSource, NewEntitlement},
    services::entitlements as entitlement_service,
    state::AppState,
};

/// Header carrying the shared webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Audit label for grants made by the payment provider.
const WEBHOOK_ACTOR: &str = "webhook:purchase";

/// A completed purchase reported by the payment provider.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEvent {
    #[garde(length(min = 1, max = 200))]
    pub user_id: String,
    #[garde(length(min = 1, max = 100))]
    pub app_id: String,
    #[garde(length(min = 1, max = 200))]
    pub payment_reference: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseRecorded {
    entitlement_id: uuid::Uuid,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Checks the shared secret in constant time.
fn verify_secret(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = state.config.purchase_webhook_secret.as_ref() else {
        tracing::warn!("Purchase webhook called but PURCHASE_WEBHOOK_SECRET is not set");
        return Err(AppError::Forbidden);
    };

    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();

    if bool::from(expected.as_bytes().ct_eq(provided)) {
        Ok(())
    } else {
        tracing::warn!("❌ Purchase webhook with a bad secret");
        Err(AppError::Unauthorized)
    }
}

/// Records a purchase as a one-year entitlement.
#[axum::debug_handler]
pub async fn purchase(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<PurchaseEvent>,
) -> Result<Response> {
    verify_secret(&state, &headers)?;
    event.validate().map_err(invalid)?;

    let entitlement = entitlement_service::grant(
        &state,
        NewEntitlement {
            user_id: event.user_id,
            app_id: event.app_id,
            source: EntitlementSource::PurchaseWebhook,
            payment_reference: Some(event.payment_reference),
            granted_by: WEBHOOK_ACTOR.to_string(),
        },
    )
    .await?;

    json_response(
        StatusCode::CREATED,
        &PurchaseRecorded {
            entitlement_id: entitlement.id,
            expires_at: entitlement.expires_at,
        },
    )
}
