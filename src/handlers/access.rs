use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Extension,
};
use serde::Serialize;

use crate::{
    error::{AppError, Result},
    handlers::response::json_response,
    models::user::Actor,
    services::entitlements as entitlement_service,
    state::AppState,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessResponse<'a> {
    app_id: &'a str,
    has_access: bool,
}

/// Reports whether the signed-in user can use `app_id` right now.
#[axum::debug_handler]
pub async fn check_access(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(app_id): Path<String>,
) -> Result<Response> {
    let user = actor.user.ok_or(AppError::Unauthorized)?;
    let app = state.catalog.require(&app_id)?;

    let has_access = entitlement_service::has_access(&state, &user.id, &app.id).await?;

    json_response(
        StatusCode::OK,
        &AccessResponse {
            app_id: &app.id,
            has_access,
        },
    )
}
