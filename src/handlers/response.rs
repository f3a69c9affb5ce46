use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Serializes `body` with `sonic_rs` into a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))?;

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// Maps a `garde` report to a validation error.
pub fn invalid(report: garde::Report) -> AppError {
    AppError::Validation(report.to_string().trim().to_string())
}
