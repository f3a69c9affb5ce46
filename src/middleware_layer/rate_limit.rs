use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

/// Extracts the real IP address from the request extensions.
///
/// # Arguments
///
/// * `req` - The incoming request.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
fn extract_real_ip(req: &Request<Body>) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A middleware that rate limits code verification per client IP.
///
/// Every attempt counts, successful or not, so codes cannot be guessed by
/// brute force. Without Redis the limiter is skipped.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The inner response, or a 429.
pub async fn rate_limit_otc_verify(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let ip = extract_real_ip(&req);
    let key = format!("rate_limit:otc_verify:{}", ip);
    let limit = state.config.verify_rate_limit;
    let window = state.config.verify_rate_window_secs;

    let counted: redis::RedisResult<(u32,)> = count_attempt(&key, window)
        .query_async(&mut redis.clone())
        .await;

    let attempts = match counted {
        Ok((attempts,)) => attempts,
        Err(e) => {
            tracing::warn!(ip = %ip, error = %e, "Rate limit counter unavailable, not limiting");
            return next.run(req).await;
        }
    };

    if attempts > limit {
        let ttl: Option<i64> = redis::cmd("TTL")
            .arg(&key)
            .query_async(&mut redis.clone())
            .await
            .unwrap_or(None);

        tracing::warn!(ip = %ip, attempts, "❌ Code verification rate limit hit");

        return AppError::RateLimitExceeded(format!(
            "Too many code attempts. Try again in {} minutes",
            retry_minutes(ttl)
        ))
        .into_response();
    }

    next.run(req).await
}

/// Opens the window if needed and counts one attempt, as one transaction.
///
/// `SET NX EX` only creates the key with its TTL; `INCR` keeps the TTL, so
/// every counter expires with its window.
fn count_attempt(key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .cmd("INCR")
        .arg(key);
    pipe
}

/// Whole minutes until the window closes, rounded up.
fn retry_minutes(ttl_secs: Option<i64>) -> i64 {
    (ttl_secs.unwrap_or(0).max(0) + 59) / 60
}
