use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    guard::{decision::Requirement, redirect::same_origin_path, sequence::{client_key, Admission}},
    handlers::response::json_response,
    models::session::SessionContext,
    state::AppState,
};

/// The query parameters of a guard evaluation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateQuery {
    /// `session`, `admin`, `admin_health_cookie` or `entitlement`.
    pub requirement: String,
    /// The page being rendered.
    #[serde(default)]
    pub path: Option<String>,
    /// The application, for `entitlement`.
    #[serde(default)]
    pub app_id: Option<String>,
    /// Client-side evaluation counter for the page.
    #[serde(default)]
    pub seq: Option<u64>,
}

#[derive(Serialize)]
struct Superseded {
    superseded: bool,
    seq: u64,
}

/// Parses the requirement named in a query.
fn parse_requirement(state: &AppState, name: &str, app_id: Option<&str>) -> Result<Requirement> {
    match name {
        "session" => Ok(Requirement::RequireSession),
        "admin" => Ok(Requirement::RequireAdmin),
        "admin_health_cookie" => Ok(Requirement::RequireAdminHealthCookie),
        "entitlement" => {
            let app_id = app_id
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| AppError::Validation("appId is required for entitlement checks".to_string()))?;
            let app = state.catalog.require(app_id)?;
            Ok(Requirement::RequireEntitlement {
                app_id: app.id.clone(),
            })
        }
        other => Err(AppError::Validation(format!("Unknown requirement '{}'", other))),
    }
}

/// Evaluates a requirement for a page and returns the decision.
///
/// The decision is always returned with 200: denial is a normal outcome the
/// page acts on. With `seq` and a signed-in session, an evaluation overtaken
/// by a newer one for the same page answers `{"superseded": true}`.
#[axum::debug_handler]
pub async fn evaluate(
    State(state): State<AppState>,
    headers: HeaderMap,
    cookies: Cookies,
    Query(query): Query<EvaluateQuery>,
) -> Result<Response> {
    let requirement = parse_requirement(&state, query.requirement.trim(), query.app_id.as_deref())?;
    let path = same_origin_path(query.path.as_deref().unwrap_or("/")).to_string();
    let ctx = SessionContext::from_headers(&headers, path);

    // Only sessions the identity provider knows get a sequencing slot.
    let mut admission = Admission::Untracked;
    if let (Some(seq), Some(cookie)) = (query.seq, cookies.get(&state.config.session_cookie_name)) {
        if state.guard.signed_in(&ctx).await {
            admission = state.sequencer.begin_at(&client_key(cookie.value(), &ctx.path), seq);
        }
    }

    let decision = match admission {
        Admission::Current(ticket) => {
            match state
                .guard
                .evaluate_latest(&state.sequencer, &ticket, &requirement, &ctx)
                .await
            {
                Some(decision) => decision,
                None => {
                    return json_response(
                        StatusCode::OK,
                        &Superseded {
                            superseded: true,
                            seq: ticket.seq(),
                        },
                    );
                }
            }
        }
        Admission::Superseded => {
            return json_response(
                StatusCode::OK,
                &Superseded {
                    superseded: true,
                    seq: query.seq.unwrap_or_default(),
                },
            );
        }
        Admission::Untracked => state.guard.evaluate(&requirement, &ctx).await,
    };

    json_response(StatusCode::OK, &decision)
}
