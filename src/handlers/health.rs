use axum::{http::StatusCode, response::Response};
use serde::Serialize;

use crate::{error::Result, handlers::response::json_response};

#[derive(Serialize)]
struct Liveness {
    status: &'static str,
    version: &'static str,
}

/// Liveness probe.
pub async fn health() -> Result<Response> {
    json_response(
        StatusCode::OK,
        &Liveness {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
    )
}
