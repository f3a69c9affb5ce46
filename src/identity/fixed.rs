//! In-process identity provider and health probe.
//!
//! Used by test environments and local setups that configure a known set of
//! sessions on the server side. The guard still runs every check against
//! them; nothing here short-circuits authorization.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tower_cookies::cookie::Cookie;

use crate::error::{AppError, Result};
use crate::identity::client::{AdminHealthProbe, HealthReport, IdentityClient};
use crate::models::{session::SessionContext, user::User};

#[derive(Debug, Default)]
struct Directory {
    sessions: HashMap<String, User>,
    admins: HashMap<String, bool>,
    unavailable: bool,
}

/// Identity provider backed by a fixed session table.
///
/// Sessions are keyed by the value of the configured session cookie.
#[derive(Debug, Clone)]
pub struct FixedIdentity {
    cookie_name: String,
    directory: Arc<RwLock<Directory>>,
}

impl FixedIdentity {
    /// Creates an empty directory reading the `cookie_name` cookie.
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            directory: Arc::new(RwLock::new(Directory::default())),
        }
    }

    /// Registers a session token for `user`.
    pub async fn add_session(&self, token: &str, user: User, is_admin: bool) {
        let mut directory = self.directory.write().await;
        directory.admins.insert(user.id.clone(), is_admin);
        directory.sessions.insert(token.to_string(), user);
    }

    /// Changes a user's admin flag.
    pub async fn set_admin(&self, user_id: &str, is_admin: bool) {
        self.directory
            .write()
            .await
            .admins
            .insert(user_id.to_string(), is_admin);
    }

    /// Simulates the provider being unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.directory.write().await.unavailable = unavailable;
    }

    fn session_token(&self, ctx: &SessionContext) -> Option<String> {
        let header = ctx.cookie_header.as_deref()?;
        Cookie::split_parse(header)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == self.cookie_name)
            .map(|cookie| cookie.value().to_string())
    }
}

#[async_trait]
impl IdentityClient for FixedIdentity {
    async fn current_user(&self, ctx: &SessionContext) -> Result<Option<User>> {
        let directory = self.directory.read().await;
        if directory.unavailable {
            return Err(AppError::SessionUnavailable("identity provider offline".to_string()));
        }

        Ok(self
            .session_token(ctx)
            .and_then(|token| directory.sessions.get(&token).cloned()))
    }

    async fn is_admin(&self, user: &User) -> Result<bool> {
        let directory = self.directory.read().await;
        if directory.unavailable {
            return Err(AppError::SessionUnavailable("identity provider offline".to_string()));
        }

        Ok(directory.admins.get(&user.id).copied().unwrap_or(false))
    }
}

/// What a [`FixedHealthProbe`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScript {
    Respond(HealthReport),
    NoResponse,
}

/// Admin health probe returning a scripted answer.
#[derive(Debug, Clone)]
pub struct FixedHealthProbe {
    script: Arc<RwLock<ProbeScript>>,
}

impl FixedHealthProbe {
    /// Creates a probe that answers with `status`.
    pub fn responding(status: u16, needs_setup: bool) -> Self {
        Self {
            script: Arc::new(RwLock::new(ProbeScript::Respond(HealthReport {
                status,
                needs_setup,
            }))),
        }
    }

    /// Replaces the scripted answer.
    pub async fn set(&self, script: ProbeScript) {
        *self.script.write().await = script;
    }
}

#[async_trait]
impl AdminHealthProbe for FixedHealthProbe {
    async fn probe(&self, _ctx: &SessionContext) -> Result<HealthReport> {
        match *self.script.read().await {
            ProbeScript::Respond(report) => Ok(report),
            ProbeScript::NoResponse => Err(AppError::Internal("health endpoint unreachable".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_sessions_by_cookie() {
        let identity = FixedIdentity::new("session");
        identity.add_session("tok-1", User::new("42"), false).await;

        let ctx = SessionContext::new("/").with_cookies("theme=dark; session=tok-1");
        let user = identity.current_user(&ctx).await.unwrap().unwrap();
        assert_eq!(user.id, "42");
        assert!(!identity.is_admin(&user).await.unwrap());

        let other = SessionContext::new("/").with_cookies("session=tok-2");
        assert!(identity.current_user(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unavailable_directory_errors() {
        let identity = FixedIdentity::new("session");
        identity.set_unavailable(true).await;
        let ctx = SessionContext::new("/").with_cookies("session=tok-1");
        assert!(identity.current_user(&ctx).await.is_err());
    }
}
