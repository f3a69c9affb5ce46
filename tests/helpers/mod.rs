//! Shared helpers for the integration tests.
//!
//! The router is built over in-memory stores, a fixed identity provider and
//! recording delivery channels, then driven in-process with `oneshot`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use http::{header, Request, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;
use zeroize::Zeroizing;

use access_gate::config::{AdminGuardMode, Config};
use access_gate::error::{AppError, Result};
use access_gate::identity::fixed::{FixedHealthProbe, FixedIdentity};
use access_gate::models::user::User;
use access_gate::notify::sender::{EmailSender, SmsSender};
use access_gate::repositories::memory::{MemoryEntitlementStore, MemoryOtcStore};
use access_gate::state::{AppState, Backends};

pub const ADMIN_SESSION: &str = "admin-session-token";
pub const USER_SESSION: &str = "user-session-token";
pub const ADMIN_ID: &str = "1";
pub const USER_ID: &str = "42";
pub const WEBHOOK_SECRET: &str = "whsec-test-0123456789";

/// One message handed to a recording channel.
#[derive(Debug, Clone)]
pub struct Sent {
    pub to: String,
    pub subject: Option<String>,
    pub body: String,
}

/// Delivery channel that records messages and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<Sent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingChannel {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    /// The code contained in the most recent message.
    pub async fn last_code(&self) -> String {
        let sent = self.sent.lock().await;
        let body = &sent.last().expect("no message sent").body;
        extract_code(body)
    }

    async fn record(&self, to: &str, subject: Option<&str>, body: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Internal("gateway rejected the message".to_string()));
        }
        self.sent.lock().await.push(Sent {
            to: to.to_string(),
            subject: subject.map(str::to_string),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl SmsSender for RecordingChannel {
    async fn send_sms(&self, phone: &str, body: &str) -> Result<()> {
        self.record(phone, None, body).await
    }
}

#[async_trait]
impl EmailSender for RecordingChannel {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.record(to, Some(subject), body).await
    }
}

/// Pulls the code out of a message: the first 8-symbol uppercase token.
pub fn extract_code(body: &str) -> String {
    body.split_whitespace()
        .map(|word| word.trim_end_matches(['.', ',', ':']))
        .find(|word| {
            word.len() == 8
                && word
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        })
        .expect("no code in message")
        .to_string()
}

/// A parsed response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Test application context.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub identity: FixedIdentity,
    pub health: FixedHealthProbe,
    pub otc_store: MemoryOtcStore,
    pub entitlements: MemoryEntitlementStore,
    pub sms: RecordingChannel,
    pub email: RecordingChannel,
}

impl TestApp {
    /// An app with the identity-based admin guard.
    pub async fn new() -> Self {
        Self::with_config(Self::config()).await
    }

    /// An app whose admin API is guarded by the health-cookie check.
    pub async fn with_health_cookie_guard() -> Self {
        Self::with_config(Config {
            admin_guard: AdminGuardMode::HealthCookie,
            ..Self::config()
        })
        .await
    }

    pub fn config() -> Config {
        Config {
            purchase_webhook_secret: Some(Zeroizing::new(WEBHOOK_SECRET.to_string())),
            ..Config::default()
        }
    }

    pub async fn with_config(config: Config) -> Self {
        let identity = FixedIdentity::new(config.session_cookie_name.clone());
        identity
            .add_session(ADMIN_SESSION, User::new(ADMIN_ID), true)
            .await;
        identity
            .add_session(USER_SESSION, User::new(USER_ID), false)
            .await;

        let health = FixedHealthProbe::responding(200, false);
        let otc_store = MemoryOtcStore::new();
        let entitlements = MemoryEntitlementStore::new();
        let sms = RecordingChannel::default();
        let email = RecordingChannel::default();

        let state = AppState::assemble(
            config,
            Backends {
                identity: Arc::new(identity.clone()),
                health: Arc::new(health.clone()),
                otc_store: Arc::new(otc_store.clone()),
                entitlements: Arc::new(entitlements.clone()),
                sms: Arc::new(sms.clone()),
                email: Arc::new(email.clone()),
                redis: None,
            },
        );

        Self {
            router: access_gate::build_router(state.clone()),
            state,
            identity,
            health,
            otc_store,
            entitlements,
            sms,
            email,
        }
    }

    /// Sends a request, with the session cookie for `session` if given.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        session: Option<&str>,
    ) -> TestResponse {
        let mut headers = Vec::new();
        if let Some(token) = session {
            headers.push(("cookie", format!("session={}", token)));
        }
        self.request_with_headers(method, uri, body, &headers).await
    }

    /// Sends a request with explicit extra headers.
    pub async fn request_with_headers(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, String)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    /// Issues a code as the admin and returns it as read from the SMS.
    pub async fn issue_code(&self, phone: &str, course_id: &str) -> String {
        let response = self
            .request(
                "POST",
                "/admin/otc/issue",
                Some(serde_json::json!({
                    "name": "Asha",
                    "phone": phone,
                    "courseId": course_id,
                    "reason": "promotional",
                })),
                Some(ADMIN_SESSION),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        self.sms.last_code().await
    }

    /// Grants `app_id` to `user_id` as the admin; returns the new row's id.
    pub async fn grant(&self, user_id: &str, app_id: &str) -> String {
        let response = self
            .request(
                "POST",
                "/admin/entitlements",
                Some(serde_json::json!({ "userId": user_id, "appId": app_id })),
                Some(ADMIN_SESSION),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().to_string()
    }

    /// Whether the test user currently has access to `app_id`.
    pub async fn user_has_access(&self, app_id: &str) -> bool {
        let response = self
            .request("GET", &format!("/access/{}", app_id), None, Some(USER_SESSION))
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body["hasAccess"].as_bool().unwrap()
    }
}
