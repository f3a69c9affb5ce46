use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Request bodies here are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::COOKIE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

/// Builds the HTTP router over `state`.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// The `Router`, ready to serve.
pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/otc/issue", post(handlers::otc::issue_code))
        .route("/admin/otc", get(handlers::otc::list_codes))
        .route(
            "/admin/entitlements",
            post(handlers::entitlements::grant).get(handlers::entitlements::list),
        )
        .route("/admin/entitlements/{id}", patch(handlers::entitlements::update))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_admin,
        ))
        .with_state(state.clone());

    let session_routes = Router::new()
        .route("/access/{app_id}", get(handlers::access::check_access))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_session,
        ))
        .with_state(state.clone());

    let verify_routes = Router::new()
        .route("/otc/verify", post(handlers::otc::verify_code))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_otc_verify,
        ))
        .with_state(state.clone());

    let open_routes = Router::new()
        .route("/guard/evaluate", get(handlers::guard::evaluate))
        .route("/webhooks/purchase", post(handlers::webhooks::purchase))
        .route("/health", get(handlers::health::health))
        .with_state(state.clone());

    Router::new()
        .merge(admin_routes)
        .merge(session_routes)
        .merge(verify_routes)
        .merge(open_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(&state.config.cors_origins))
}
