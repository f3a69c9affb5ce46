use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::identity::client::{AdminHealthProbe, HealthReport, IdentityClient};
use crate::models::{session::SessionContext, user::User};

/// Body of `GET /current-session`.
#[derive(Deserialize)]
struct CurrentSession {
    #[serde(default)]
    user: Option<User>,
}

/// Body of `GET /admin-role/{id}`: a bare boolean or a wrapped one.
#[derive(Deserialize)]
#[serde(untagged)]
enum AdminRole {
    Bare(bool),
    Wrapped {
        #[serde(alias = "is_admin", alias = "isAdmin")]
        admin: bool,
    },
}

impl AdminRole {
    fn is_admin(&self) -> bool {
        match self {
            AdminRole::Bare(flag) => *flag,
            AdminRole::Wrapped { admin } => *admin,
        }
    }
}

/// Body of `GET /admin/health`.
#[derive(Deserialize, Default)]
struct HealthBody {
    #[serde(default)]
    needs_setup: bool,
}

/// Builds the shared outbound client.
pub fn outbound_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("access-gate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::from)
}

/// Identity provider reached over HTTP.
#[derive(Clone)]
pub struct HttpIdentityClient {
    client: Client,
    base_url: String,
    service_token: Option<Zeroizing<String>>,
}

impl HttpIdentityClient {
    /// Creates a client for the provider rooted at `base_url`.
    pub fn new(client: Client, base_url: &str, service_token: Option<Zeroizing<String>>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        }
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn current_user(&self, ctx: &SessionContext) -> Result<Option<User>> {
        let Some(cookies) = ctx.cookie_header.as_deref() else {
            tracing::debug!("No cookies on request, skipping identity lookup");
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/current-session", self.base_url))
            .header(header::COOKIE, cookies)
            .send()
            .await
            .map_err(|e| AppError::SessionUnavailable(format!("current-session: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Ok(None),
            status if !status.is_success() => {
                return Err(AppError::SessionUnavailable(format!(
                    "current-session answered {}",
                    status
                )));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::SessionUnavailable(format!("current-session body: {}", e)))?;

        let session: CurrentSession = sonic_rs::from_str(&body)
            .map_err(|e| AppError::SessionUnavailable(format!("malformed current-session: {}", e)))?;

        Ok(session.user)
    }

    async fn is_admin(&self, user: &User) -> Result<bool> {
        let url = format!(
            "{}/admin-role/{}",
            self.base_url,
            utf8_percent_encode(&user.id, NON_ALPHANUMERIC)
        );

        let mut request = self.client.get(url);
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::SessionUnavailable(format!("admin-role: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::SessionUnavailable(format!(
                "admin-role answered {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::SessionUnavailable(format!("admin-role body: {}", e)))?;

        let role: AdminRole = sonic_rs::from_str(&body)
            .map_err(|e| AppError::SessionUnavailable(format!("malformed admin-role: {}", e)))?;

        Ok(role.is_admin())
    }
}

/// Admin health endpoint reached over HTTP.
#[derive(Clone)]
pub struct HttpAdminHealthProbe {
    client: Client,
    url: String,
}

impl HttpAdminHealthProbe {
    /// Creates a probe for the endpoint at `url`.
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl AdminHealthProbe for HttpAdminHealthProbe {
    async fn probe(&self, ctx: &SessionContext) -> Result<HealthReport> {
        let mut request = self.client.get(&self.url);
        if let Some(cookies) = ctx.cookie_header.as_deref() {
            request = request.header(header::COOKIE, cookies);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();

        // A missing or unparsable body only means no setup flag.
        let body = response.text().await.unwrap_or_default();
        let needs_setup = sonic_rs::from_str::<HealthBody>(&body)
            .unwrap_or_default()
            .needs_setup;

        Ok(HealthReport {
            status,
            needs_setup,
        })
    }
}
