use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    handlers::response::{invalid, json_response},
    models::{
        otc::{OtcAuditEntry, OtcReason, Recipient},
        user::Actor,
    },
    services::otc as otc_service,
    state::AppState,
    validation::otc::{normalize_email, validate_phone},
};

/// The request payload for issuing a code.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IssueCodeRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: String,
    #[garde(custom(validate_phone))]
    pub phone: String,
    #[garde(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[garde(length(min = 1, max = 100))]
    pub course_id: String,
    #[garde(skip)]
    pub reason: OtcReason,
}

/// The request payload for redeeming a code.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    #[garde(length(min = 1, max = 64))]
    pub code: String,
    #[garde(length(min = 1, max = 100))]
    pub course_id: String,
}

/// The query parameters of the audit listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCodesQuery {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Serialize)]
struct CodeList<'a> {
    codes: &'a [OtcAuditEntry],
    count: usize,
}

/// Issues a code and delivers it. The response never carries the code.
#[axum::debug_handler]
pub async fn issue_code(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(mut payload): Json<IssueCodeRequest>,
) -> Result<Response> {
    payload.email = normalize_email(payload.email.as_deref());
    payload.validate().map_err(invalid)?;

    let result = otc_service::issue_code(
        &state,
        Recipient {
            name: payload.name,
            phone: payload.phone,
            email: payload.email,
        },
        &payload.course_id,
        payload.reason,
        &actor.label(),
    )
    .await?;

    json_response(StatusCode::CREATED, &result)
}

/// Redeems a code for a course.
#[axum::debug_handler]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<VerifyCodeRequest>,
) -> Result<Response> {
    payload.validate().map_err(invalid)?;

    let redemption = otc_service::verify_code(&state, &payload.code, &payload.course_id).await?;

    json_response(StatusCode::OK, &redemption)
}

/// Lists recently issued codes.
#[axum::debug_handler]
pub async fn list_codes(
    State(state): State<AppState>,
    Query(query): Query<ListCodesQuery>,
) -> Result<Response> {
    let codes = otc_service::list_codes(&state, query.course_id.as_deref(), query.limit).await?;

    json_response(
        StatusCode::OK,
        &CodeList {
            count: codes.len(),
            codes: &codes,
        },
    )
}
