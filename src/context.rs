/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    error::PortalResult,
    gate_pass::GatePassManager,
    invitation::InvitationManager,
    mailer::Mailer,
    payment::{DarajaClient, PaymentManager, PushPaymentProvider},
    property::PropertyManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub property_manager: Arc<PropertyManager>,
    pub invitation_manager: Arc<InvitationManager>,
    pub gate_pass_manager: Arc<GatePassManager>,
    pub payment_manager: Arc<PaymentManager>,
    // Rate limiter
    pub rate_limiter: Arc<RateLimiter>,
    // Email mailer
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> PortalResult<Self> {
        // Validate configuration
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        // Run migrations
        db::run_migrations(&db).await?;

        // Test connection
        db::test_connection(&db).await?;

        let provider: Arc<dyn PushPaymentProvider> =
            Arc::new(DarajaClient::new(config.payments.request_timeout_secs)?);

        Self::from_parts(config, db, provider)
    }

    /// Wire every manager onto an open pool
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        provider: Arc<dyn PushPaymentProvider>,
    ) -> PortalResult<Self> {
        let config = Arc::new(config);

        let account_manager = Arc::new(AccountManager::new(db.clone(), config.clone()));
        let property_manager = Arc::new(PropertyManager::new(db.clone()));
        let invitation_manager = Arc::new(InvitationManager::new(db.clone(), config.invites.ttl_days));
        let gate_pass_manager = Arc::new(GatePassManager::new(db.clone()));
        let payment_manager = Arc::new(PaymentManager::new(
            db.clone(),
            provider,
            config.payments.clone(),
        ));

        // Initialize rate limiter
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        // Initialize mailer
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config,
            db,
            account_manager,
            property_manager,
            invitation_manager,
            gate_pass_manager,
            payment_manager,
            rate_limiter,
            mailer,
        })
    }

    /// Signup link carried by an invitation
    pub fn signup_url(&self, token: &str) -> String {
        format!("{}/signup?invite={}", self.config.service.base_url, token)
    }

    /// Context over an in-memory database with an accepting payment provider
    #[cfg(test)]
    pub async fn for_tests() -> Self {
        Self::with_provider(Arc::new(crate::test_support::FakeProvider::accepting())).await
    }

    #[cfg(test)]
    pub async fn with_provider(provider: Arc<dyn PushPaymentProvider>) -> Self {
        Self::from_parts(ServerConfig::for_tests(), db::memory_pool().await, provider).unwrap()
    }
}
