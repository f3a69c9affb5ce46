use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::config::{AdminGuardMode, Config};
use crate::error::Result;
use crate::guard::decision::Requirement;
use crate::guard::evaluator::{Guard, GuardPolicy};
use crate::guard::sequence::EvaluationSequencer;
use crate::identity::client::{AdminHealthProbe, IdentityClient};
use crate::identity::http::{outbound_client, HttpAdminHealthProbe, HttpIdentityClient};
use crate::models::otc::DeliveryChannel;
use crate::notify::http::HttpGateway;
use crate::notify::sender::{EmailSender, SmsSender, UnconfiguredChannel};
use crate::repositories::entitlement::{EntitlementStore, PgEntitlementStore};
use crate::repositories::otc::{OtcStore, PgOtcStore};
use crate::services::catalog::CourseCatalog;

/// The collaborators an [`AppState`] is assembled from.
pub struct Backends {
    /// The identity provider.
    pub identity: Arc<dyn IdentityClient>,
    /// The admin health endpoint.
    pub health: Arc<dyn AdminHealthProbe>,
    /// One-time code persistence.
    pub otc_store: Arc<dyn OtcStore>,
    /// Entitlement persistence.
    pub entitlements: Arc<dyn EntitlementStore>,
    /// The SMS channel.
    pub sms: Arc<dyn SmsSender>,
    /// The email channel.
    pub email: Arc<dyn EmailSender>,
    /// Redis, for rate limiting. `None` disables it.
    pub redis: Option<ConnectionManager>,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// The Redis connection manager, if configured.
    pub redis: Option<ConnectionManager>,
    /// The guard evaluator.
    pub guard: Guard,
    /// Last-evaluation-wins bookkeeping shared by guard and list endpoints.
    pub sequencer: Arc<EvaluationSequencer>,
    /// The known courses.
    pub catalog: CourseCatalog,
    /// One-time code persistence.
    pub otc_store: Arc<dyn OtcStore>,
    /// Entitlement persistence.
    pub entitlements: Arc<dyn EntitlementStore>,
    /// The SMS channel.
    pub sms: Arc<dyn SmsSender>,
    /// The email channel.
    pub email: Arc<dyn EmailSender>,
}

impl AppState {
    /// Creates the production `AppState`: Postgres stores, HTTP identity
    /// provider and gateways, optional Redis.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url)?;
        crate::db::run_migrations(&db).await?;
        tracing::info!("✅ PostgreSQL pool initialized and schema applied");

        let redis = match &config.redis_url {
            Some(url) => {
                let client = redis::Client::open(url.as_str())?;
                let manager = ConnectionManager::new(client).await?;
                tracing::info!("✅ Redis Connection Manager initialized");
                Some(manager)
            }
            None => {
                tracing::warn!("⚠️ REDIS_URL not set, code verification is not rate limited");
                None
            }
        };

        let http = outbound_client(config.outbound_timeout)?;

        let identity = Arc::new(HttpIdentityClient::new(
            http.clone(),
            &config.identity_base_url,
            config.identity_service_token.clone(),
        ));
        let health = Arc::new(HttpAdminHealthProbe::new(http.clone(), &config.admin_health_url));
        tracing::info!("✅ Identity provider client initialized: {}", config.identity_base_url);

        let sms: Arc<dyn SmsSender> = match &config.sms_gateway_url {
            Some(url) => Arc::new(HttpGateway::new(http.clone(), url, config.sms_gateway_token.clone())),
            None => {
                tracing::warn!("⚠️ SMS_GATEWAY_URL not set, SMS delivery will fail");
                Arc::new(UnconfiguredChannel(DeliveryChannel::Sms))
            }
        };

        let email: Arc<dyn EmailSender> = match &config.email_gateway_url {
            Some(url) => Arc::new(HttpGateway::new(http.clone(), url, config.email_gateway_token.clone())),
            None => {
                tracing::warn!("⚠️ EMAIL_GATEWAY_URL not set, email delivery will fail");
                Arc::new(UnconfiguredChannel(DeliveryChannel::Email))
            }
        };

        Ok(Self::assemble(
            config.clone(),
            Backends {
                identity,
                health,
                otc_store: Arc::new(PgOtcStore::new(db.clone())),
                entitlements: Arc::new(PgEntitlementStore::new(db)),
                sms,
                email,
                redis,
            },
        ))
    }

    /// Builds the state from explicit collaborators.
    pub fn assemble(config: Config, backends: Backends) -> Self {
        let guard = Guard::new(
            backends.identity,
            backends.health,
            backends.entitlements.clone(),
            GuardPolicy {
                health_fail_open: config.admin_health_fail_open,
            },
        );

        if config.admin_health_fail_open {
            tracing::warn!("⚠️ ADMIN_HEALTH_FAIL_OPEN is on: admin health errors will be treated as authorized");
        }

        Self {
            catalog: config.catalog.clone(),
            config,
            redis: backends.redis,
            guard,
            sequencer: Arc::new(EvaluationSequencer::new()),
            otc_store: backends.otc_store,
            entitlements: backends.entitlements,
            sms: backends.sms,
            email: backends.email,
        }
    }

    /// The requirement protecting the admin API, per configuration.
    pub fn admin_requirement(&self) -> Requirement {
        match self.config.admin_guard {
            AdminGuardMode::Identity => Requirement::RequireAdmin,
            AdminGuardMode::HealthCookie => Requirement::RequireAdminHealthCookie,
        }
    }
}
