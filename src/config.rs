use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::services::catalog::{CourseCatalog, DEFAULT_COURSE_CATALOG};

/// Which guard protects the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminGuardMode {
    /// Full identity-provider session plus admin-role lookup.
    Identity,
    /// Admin cookie validated by the admin health endpoint.
    HealthCookie,
}

impl AdminGuardMode {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Self::Identity),
            "health-cookie" | "health_cookie" => Ok(Self::HealthCookie),
            other => anyhow::bail!("ADMIN_GUARD must be 'identity' or 'health-cookie', got '{}'", other),
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server. Rate limiting is disabled without it.
    pub redis_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Base URL of the identity provider (`/current-session`, `/admin-role/{id}`).
    pub identity_base_url: String,
    /// Bearer token for the identity provider's role endpoint.
    pub identity_service_token: Option<Zeroizing<String>>,
    /// Full URL of the admin health endpoint.
    pub admin_health_url: String,
    /// Treat non-401 error statuses from the health endpoint as authorized.
    pub admin_health_fail_open: bool,
    /// Which guard protects the admin API.
    pub admin_guard: AdminGuardMode,
    /// The SMS gateway endpoint.
    pub sms_gateway_url: Option<String>,
    /// The SMS gateway bearer token.
    pub sms_gateway_token: Option<Zeroizing<String>>,
    /// The email gateway endpoint.
    pub email_gateway_url: Option<String>,
    /// The email gateway bearer token.
    pub email_gateway_token: Option<Zeroizing<String>>,
    /// Shared secret expected in `x-webhook-secret` on purchase webhooks.
    pub purchase_webhook_secret: Option<Zeroizing<String>>,
    /// The known courses and applications.
    pub catalog: CourseCatalog,
    /// Timeout applied to every outbound HTTP call.
    pub outbound_timeout: Duration,
    /// Name of the identity provider's session cookie.
    pub session_cookie_name: String,
    /// Maximum code verification attempts per client per window.
    pub verify_rate_limit: u32,
    /// Length of the verification rate-limit window in seconds.
    pub verify_rate_window_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/access_gate".to_string(),
            redis_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: vec!["http://localhost:3000".to_string()],
            identity_base_url: "http://127.0.0.1:4000".to_string(),
            identity_service_token: None,
            admin_health_url: "http://127.0.0.1:4000/admin/health".to_string(),
            admin_health_fail_open: false,
            admin_guard: AdminGuardMode::Identity,
            sms_gateway_url: None,
            sms_gateway_token: None,
            email_gateway_url: None,
            email_gateway_token: None,
            purchase_webhook_secret: None,
            catalog: CourseCatalog::default(),
            outbound_timeout: Duration::from_secs(5),
            session_cookie_name: "session".to_string(),
            verify_rate_limit: 10,
            verify_rate_window_secs: 900,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn secret(name: &str) -> Option<Zeroizing<String>> {
    optional(name).map(Zeroizing::new)
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let identity_base_url = env::var("IDENTITY_BASE_URL")
            .context("IDENTITY_BASE_URL must be set")?
            .trim_end_matches('/')
            .to_string();

        let admin_health_url = optional("ADMIN_HEALTH_URL")
            .unwrap_or_else(|| format!("{}/admin/health", identity_base_url));

        let catalog = CourseCatalog::parse(
            &optional("COURSE_CATALOG").unwrap_or_else(|| DEFAULT_COURSE_CATALOG.to_string()),
        )
        .context("Invalid COURSE_CATALOG")?;

        let cors_origins = optional("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.cors_origins);

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: optional("REDIS_URL"),
            bind_addr: optional("BIND_ADDR")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid BIND_ADDR")?
                .unwrap_or(defaults.bind_addr),
            cors_origins,
            identity_base_url,
            identity_service_token: secret("IDENTITY_SERVICE_TOKEN"),
            admin_health_url,
            admin_health_fail_open: optional("ADMIN_HEALTH_FAIL_OPEN")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid ADMIN_HEALTH_FAIL_OPEN (expected true or false)")?
                .unwrap_or(false),
            admin_guard: optional("ADMIN_GUARD")
                .map(|v| AdminGuardMode::parse(&v))
                .transpose()?
                .unwrap_or(AdminGuardMode::Identity),
            sms_gateway_url: optional("SMS_GATEWAY_URL"),
            sms_gateway_token: secret("SMS_GATEWAY_TOKEN"),
            email_gateway_url: optional("EMAIL_GATEWAY_URL"),
            email_gateway_token: secret("EMAIL_GATEWAY_TOKEN"),
            purchase_webhook_secret: secret("PURCHASE_WEBHOOK_SECRET"),
            catalog,
            outbound_timeout: Duration::from_secs(
                optional("OUTBOUND_TIMEOUT_SECS")
                    .unwrap_or_else(|| "5".to_string())
                    .parse()
                    .context("Invalid OUTBOUND_TIMEOUT_SECS")?,
            ),
            session_cookie_name: optional("SESSION_COOKIE_NAME")
                .unwrap_or(defaults.session_cookie_name),
            verify_rate_limit: optional("OTC_VERIFY_RATE_LIMIT")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("Invalid OTC_VERIFY_RATE_LIMIT")?,
            verify_rate_window_secs: optional("OTC_VERIFY_RATE_WINDOW_SECS")
                .unwrap_or_else(|| "900".to_string())
                .parse()
                .context("Invalid OTC_VERIFY_RATE_WINDOW_SECS")?,
        })
    }
}
