//! The single decision procedure every protected page runs before rendering.

use std::sync::Arc;

use chrono::Utc;

use crate::guard::decision::{Decision, Requirement};
use crate::guard::redirect::{admin_login_redirect, is_setup_path, login_redirect, ADMIN_SETUP_PATH};
use crate::guard::sequence::{EvaluationSequencer, Ticket};
use crate::identity::client::{AdminHealthProbe, HealthReport, IdentityClient};
use crate::models::{session::SessionContext, user::User};
use crate::repositories::entitlement::EntitlementStore;

/// Message shown to signed-in users without the admin role.
pub const ACCESS_DENIED: &str = "Access Denied";
/// Message shown to signed-in users without an entitlement.
pub const PURCHASE_REQUIRED: &str = "Purchase required";

/// Server-side guard settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardPolicy {
    /// Treat non-401, non-2xx health responses as authorized.
    pub health_fail_open: bool,
}

/// Evaluates [`Requirement`]s against a [`SessionContext`].
///
/// Failures never escape as errors: every path resolves to a [`Decision`],
/// and unknown states resolve to a denial.
#[derive(Clone)]
pub struct Guard {
    identity: Arc<dyn IdentityClient>,
    health: Arc<dyn AdminHealthProbe>,
    entitlements: Arc<dyn EntitlementStore>,
    policy: GuardPolicy,
}

impl Guard {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        health: Arc<dyn AdminHealthProbe>,
        entitlements: Arc<dyn EntitlementStore>,
        policy: GuardPolicy,
    ) -> Self {
        Self {
            identity,
            health,
            entitlements,
            policy,
        }
    }

    /// Evaluates `requirement` for the page at `ctx.path`.
    pub async fn evaluate(&self, requirement: &Requirement, ctx: &SessionContext) -> Decision {
        match self.authorize(requirement, ctx).await {
            Ok(_) => Decision::Allow,
            Err(decision) => decision,
        }
    }

    /// Like [`Guard::evaluate`], but yields `None` if a newer evaluation for
    /// the ticket's key started while this one was in flight.
    pub async fn evaluate_latest(
        &self,
        sequencer: &EvaluationSequencer,
        ticket: &Ticket,
        requirement: &Requirement,
        ctx: &SessionContext,
    ) -> Option<Decision> {
        let decision = self.evaluate(requirement, ctx).await;

        if sequencer.is_current(ticket) {
            Some(decision)
        } else {
            tracing::debug!(key = ticket.key(), seq = ticket.seq(), "Discarding superseded guard evaluation");
            None
        }
    }

    /// Whether the identity provider resolves `ctx` to a signed-in user.
    /// Provider errors count as signed out.
    pub async fn signed_in(&self, ctx: &SessionContext) -> bool {
        matches!(self.identity.current_user(ctx).await, Ok(Some(_)))
    }

    /// Runs the check and, on success, returns the resolved user.
    ///
    /// The user is `None` only for the health-cookie variant, which does
    /// not resolve an identity.
    pub async fn authorize(
        &self,
        requirement: &Requirement,
        ctx: &SessionContext,
    ) -> Result<Option<User>, Decision> {
        match requirement {
            Requirement::RequireSession => self.require_session(ctx).await.map(Some),
            Requirement::RequireAdmin => {
                let user = self.require_session(ctx).await?;
                self.require_admin_role(&user).await?;
                Ok(Some(user))
            }
            Requirement::RequireAdminHealthCookie => self.require_admin_cookie(ctx).await.map(|_| None),
            Requirement::RequireEntitlement { app_id } => {
                let user = self.require_session(ctx).await?;
                self.require_entitlement(&user, app_id).await?;
                Ok(Some(user))
            }
        }
    }

    async fn require_session(&self, ctx: &SessionContext) -> Result<User, Decision> {
        match self.identity.current_user(ctx).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                tracing::debug!(path = %ctx.path, "No session, redirecting to login");
                Err(Decision::redirect(login_redirect(&ctx.path)))
            }
            Err(e) => {
                tracing::warn!(path = %ctx.path, error = %e, "Identity provider failed, treating as signed out");
                Err(Decision::redirect(login_redirect(&ctx.path)))
            }
        }
    }

    async fn require_admin_role(&self, user: &User) -> Result<(), Decision> {
        match self.identity.is_admin(user).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(user_id = %user.id, "Non-admin user denied admin page");
                Err(Decision::show(ACCESS_DENIED))
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Admin role lookup failed, denying");
                Err(Decision::show(ACCESS_DENIED))
            }
        }
    }

    async fn require_admin_cookie(&self, ctx: &SessionContext) -> Result<(), Decision> {
        let report = match self.health.probe(ctx).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %ctx.path, error = %e, "Admin health check unreachable, denying");
                return Err(Decision::redirect(admin_login_redirect(&ctx.path)));
            }
        };

        match report.status {
            401 => {
                tracing::debug!(path = %ctx.path, "Admin cookie rejected");
                Err(Decision::redirect(admin_login_redirect(&ctx.path)))
            }
            200..=299 => self.setup_or_allow(report, ctx),
            status if self.policy.health_fail_open => {
                tracing::warn!(status, path = %ctx.path, "Admin health check failed, allowing (fail-open configured)");
                self.setup_or_allow(report, ctx)
            }
            status => {
                tracing::warn!(status, path = %ctx.path, "Admin health check failed, denying");
                Err(Decision::redirect(admin_login_redirect(&ctx.path)))
            }
        }
    }

    fn setup_or_allow(&self, report: HealthReport, ctx: &SessionContext) -> Result<(), Decision> {
        if report.needs_setup && !is_setup_path(&ctx.path) {
            tracing::info!("Admin console needs first-run setup");
            return Err(Decision::redirect(ADMIN_SETUP_PATH));
        }
        Ok(())
    }

    async fn require_entitlement(&self, user: &User, app_id: &str) -> Result<(), Decision> {
        match self.entitlements.has_access(&user.id, app_id, Utc::now()).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!(user_id = %user.id, app_id, "No entitlement for paid page");
                Err(Decision::show(PURCHASE_REQUIRED))
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, app_id, error = %e, "Entitlement lookup failed, denying");
                Err(Decision::show(PURCHASE_REQUIRED))
            }
        }
    }
}
