use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Database pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An outbound HTTP error (SMS, email or identity provider).
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity provider could not be reached or answered garbage.
    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    /// No session.
    #[error("Authentication required")]
    Unauthorized,

    /// A session is present but its role is insufficient.
    #[error("Forbidden")]
    Forbidden,

    /// No one-time code matches the presented value.
    #[error("Code not found")]
    CodeNotFound,

    /// The one-time code is past its expiry.
    #[error("Code expired")]
    CodeExpired,

    /// The one-time code has already been redeemed.
    #[error("Code already used")]
    CodeAlreadyConsumed,

    /// The one-time code belongs to another course.
    #[error("Code is not valid for this course")]
    CodeCourseMismatch,

    /// No entitlement row with the given id.
    #[error("Entitlement not found")]
    EntitlementNotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Machine-readable kind, sent alongside the message so admin tooling
    /// can branch without parsing strings.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Pool(_) => "database",
            AppError::Redis(_) => "cache",
            AppError::Http(_) => "upstream",
            AppError::SessionUnavailable(_) => "session_unavailable",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::CodeNotFound => "code_not_found",
            AppError::CodeExpired => "code_expired",
            AppError::CodeAlreadyConsumed => "code_already_consumed",
            AppError::CodeCourseMismatch => "code_course_mismatch",
            AppError::EntitlementNotFound => "entitlement_not_found",
            AppError::Validation(_) => "validation",
            AppError::Internal(_) => "internal",
            AppError::RateLimitExceeded(_) => "rate_limited",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Database pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }

            AppError::Http(ref e) => {
                tracing::error!("Upstream request failed: {}", e);
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }

            AppError::SessionUnavailable(ref msg) => {
                tracing::warn!("Session unavailable: {}", msg);
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }

            AppError::Unauthorized => {
                tracing::debug!("Request without session");
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }

            AppError::Forbidden => {
                tracing::warn!("Authorization failed");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::CodeNotFound => {
                tracing::debug!("One-time code not found");
                (StatusCode::NOT_FOUND, "Code not found".to_string())
            }

            AppError::CodeCourseMismatch => {
                tracing::debug!("One-time code presented for another course");
                (StatusCode::FORBIDDEN, "Code is not valid for this course".to_string())
            }

            AppError::CodeExpired => {
                tracing::debug!("One-time code expired");
                (StatusCode::GONE, "Code expired".to_string())
            }

            AppError::CodeAlreadyConsumed => {
                tracing::debug!("One-time code already used");
                (StatusCode::CONFLICT, "Code already used".to_string())
            }

            AppError::EntitlementNotFound => {
                tracing::debug!("Entitlement not found");
                (StatusCode::NOT_FOUND, "Entitlement not found".to_string())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                (StatusCode::TOO_MANY_REQUESTS, msg.clone())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "kind": self.kind()
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","kind":"internal"}"#.to_string());

        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
