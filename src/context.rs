/// Application context and dependency injection
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db::{self, AccountStore},
    error::{AppError, AppResult},
    farmers::FarmerManager,
    rate_limit::RateLimiter,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub account_db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub farmer_manager: Arc<FarmerManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        // Validate configuration
        config.validate()?;

        // Create data directory if it doesn't exist
        Self::ensure_directories(&config).await?;

        let account_db =
            db::create_pool(&config.storage.account_db, db::DatabaseOptions::default()).await?;

        Self::with_pool(config, account_db).await
    }

    /// Build the context over an existing pool. Migrations run and the seed admin is created.
    pub async fn with_pool(config: ServerConfig, account_db: SqlitePool) -> AppResult<Self> {
        config.validate()?;

        db::run_migrations(&account_db).await?;
        db::test_connection(&account_db).await?;

        let store = AccountStore::new(account_db.clone());
        let account_manager = Arc::new(AccountManager::new(
            store.clone(),
            &config.authentication,
        ));
        let farmer_manager = Arc::new(FarmerManager::new(store));

        if let Some(seed) = &config.authentication.seed_admin {
            account_manager.seed_admin(seed).await?;
        }

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            account_db,
            account_manager,
            farmer_manager,
            rate_limiter,
        })
    }

    /// Ensure required directories exist
    async fn ensure_directories(config: &ServerConfig) -> AppResult<()> {
        let dir = &config.storage.data_directory;
        if config.storage.account_db.as_os_str() != ":memory:" && !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
