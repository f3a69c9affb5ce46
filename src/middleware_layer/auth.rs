use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    guard::decision::{Decision, Requirement},
    handlers::response::json_response,
    models::{session::SessionContext, user::Actor},
    state::AppState,
};

/// Turns a denial into an API response the console can act on.
///
/// Redirects become 401 and notices become 403; the body is the decision.
fn denied(decision: &Decision) -> Response {
    let status = match decision {
        Decision::DenyShow { .. } => StatusCode::FORBIDDEN,
        _ => StatusCode::UNAUTHORIZED,
    };

    json_response(status, decision).unwrap_or_else(IntoResponse::into_response)
}

/// Runs `requirement` for the request and stores the resolved [`Actor`].
async fn enforce(
    state: &AppState,
    requirement: Requirement,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let ctx = SessionContext::from_request(&request);

    match state.guard.authorize(&requirement, &ctx).await {
        Ok(user) => {
            tracing::debug!(path = %ctx.path, user = ?user.as_ref().map(|u| &u.id), "✅ Guard passed");
            request.extensions_mut().insert(Actor { user });
            next.run(request).await
        }
        Err(decision) => {
            tracing::debug!(path = %ctx.path, ?decision, "🔐 Guard denied request");
            denied(&decision)
        }
    }
}

/// A middleware that requires a signed-in user.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The inner response, or the guard's denial.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    enforce(&state, Requirement::RequireSession, request, next).await
}

/// A middleware that requires an admin, using the configured admin guard.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The inner response, or the guard's denial.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let requirement = state.admin_requirement();
    enforce(&state, requirement, request, next).await
}
