//! Seams to the external identity provider.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{session::SessionContext, user::User};

/// The identity provider as seen by the guard.
///
/// Implementations must report transport failures and malformed payloads as
/// errors; the guard decides how to fail.
#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    /// Resolves the user behind the caller's session, if any.
    async fn current_user(&self, ctx: &SessionContext) -> Result<Option<User>>;

    /// Asks the provider whether `user` holds the admin role.
    async fn is_admin(&self, user: &User) -> Result<bool>;
}

/// What the admin health endpoint answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    /// The HTTP status code.
    pub status: u16,
    /// Whether the payload asked for first-run setup.
    pub needs_setup: bool,
}

/// The admin health endpoint, used by the lightweight admin guard.
#[async_trait]
pub trait AdminHealthProbe: Send + Sync + 'static {
    /// Calls the endpoint with the caller's cookies.
    ///
    /// `Err` means no response was received at all.
    async fn probe(&self, ctx: &SessionContext) -> Result<HealthReport>;
}
