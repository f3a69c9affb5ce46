use axum::http::{header, HeaderMap, Request};

/// The ambient request context a guard evaluation runs against.
///
/// Everything the guard knows about the caller travels in this value: the
/// raw cookie header forwarded to the identity provider and the path the
/// page is being rendered for. There is no process-wide session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// The caller's `Cookie` header, forwarded verbatim upstream.
    pub cookie_header: Option<String>,
    /// The path (with query) being guarded.
    pub path: String,
}

impl SessionContext {
    /// Creates a context for `path` without cookies.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            cookie_header: None,
            path: path.into(),
        }
    }

    /// Attaches a cookie header.
    pub fn with_cookies(mut self, cookie_header: impl Into<String>) -> Self {
        self.cookie_header = Some(cookie_header.into());
        self
    }

    /// Builds a context from request headers and an explicit path.
    pub fn from_headers(headers: &HeaderMap, path: impl Into<String>) -> Self {
        let cookie_header = headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Self {
            cookie_header,
            path: path.into(),
        }
    }

    /// Builds a context for the request's own path.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        Self::from_headers(request.headers(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn request_context_keeps_query_and_cookies() {
        let request = Request::builder()
            .uri("/admin/entitlements?userId=42")
            .header(header::COOKIE, "session=abc")
            .body(Body::empty())
            .unwrap();

        let ctx = SessionContext::from_request(&request);
        assert_eq!(ctx.path, "/admin/entitlements?userId=42");
        assert_eq!(ctx.cookie_header.as_deref(), Some("session=abc"));
    }
}
