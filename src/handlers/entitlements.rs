use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use chrono::Utc;
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    guard::sequence::{client_key, Admission},
    handlers::response::{invalid, json_response},
    models::{
        entitlement::{EffectiveStatus, Entitlement, EntitlementSource, NewEntitlement},
        user::Actor,
    },
    services::entitlements as entitlement_service,
    state::AppState,
};

/// The request payload for an admin grant.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    #[garde(length(min = 1, max = 200))]
    pub user_id: String,
    #[garde(length(min = 1, max = 100))]
    pub app_id: String,
    #[garde(length(max = 200))]
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// The request payload for changing an entitlement. Only revocation exists.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[garde(length(min = 1, max = 20))]
    pub status: String,
    #[garde(length(max = 500))]
    #[serde(default)]
    pub reason: Option<String>,
}

/// The query parameters for listing a user's entitlements.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub user_id: String,
    /// Client-side request counter; stale responses are discarded.
    #[serde(default)]
    pub seq: Option<u64>,
}

/// An entitlement with its status at response time.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntitlementView<'a> {
    #[serde(flatten)]
    entitlement: &'a Entitlement,
    effective_status: EffectiveStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntitlementList<'a> {
    user_id: &'a str,
    entitlements: Vec<EntitlementView<'a>>,
    count: usize,
}

#[derive(Serialize)]
struct Superseded {
    superseded: bool,
    seq: u64,
}

fn view(entitlement: &Entitlement) -> EntitlementView<'_> {
    EntitlementView {
        effective_status: entitlement.effective_status(Utc::now()),
        entitlement,
    }
}

/// Grants an application to a user on behalf of an admin.
#[axum::debug_handler]
pub async fn grant(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<GrantRequest>,
) -> Result<Response> {
    payload.validate().map_err(invalid)?;

    let entitlement = entitlement_service::grant(
        &state,
        NewEntitlement {
            user_id: payload.user_id,
            app_id: payload.app_id,
            source: EntitlementSource::Admin,
            payment_reference: payload.payment_reference,
            granted_by: actor.label(),
        },
    )
    .await?;

    json_response(StatusCode::CREATED, &view(&entitlement))
}

/// Revokes an entitlement.
#[axum::debug_handler]
pub async fn update(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Response> {
    payload.validate().map_err(invalid)?;

    if payload.status != "revoked" {
        return Err(AppError::Validation(
            "Only status \"revoked\" can be set".to_string(),
        ));
    }

    let entitlement =
        entitlement_service::revoke(&state, id, &actor.label(), payload.reason.as_deref()).await?;

    json_response(StatusCode::OK, &view(&entitlement))
}

/// Lists a user's entitlements, newest purchase first.
///
/// With `seq`, a response is only returned if no later request from the same
/// console started while this one was loading.
#[axum::debug_handler]
pub async fn list(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let ticket = match (query.seq, cookies.get(&state.config.session_cookie_name)) {
        (Some(seq), Some(cookie)) => {
            let key = client_key(cookie.value(), "admin/entitlements");
            match state.sequencer.begin_at(&key, seq) {
                Admission::Current(ticket) => Some(ticket),
                Admission::Superseded => {
                    return json_response(StatusCode::OK, &Superseded { superseded: true, seq });
                }
                Admission::Untracked => None,
            }
        }
        _ => None,
    };

    let entitlements = entitlement_service::list(&state, &query.user_id).await?;

    if let Some(ticket) = ticket {
        if !state.sequencer.is_current(&ticket) {
            tracing::debug!(seq = ticket.seq(), "Discarding superseded entitlement listing");
            return json_response(
                StatusCode::OK,
                &Superseded {
                    superseded: true,
                    seq: ticket.seq(),
                },
            );
        }
    }

    let views: Vec<_> = entitlements.iter().map(view).collect();
    json_response(
        StatusCode::OK,
        &EntitlementList {
            user_id: query.user_id.trim(),
            count: views.len(),
            entitlements: views,
        },
    )
}
