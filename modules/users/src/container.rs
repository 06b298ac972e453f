//! Composition root for the users service
//!
//! Built once in `main` and shared as `Arc<AppContainer>`: the HTTP router
//! reads it as state and the registration consumer borrows its bus.

use event_bus::{
    spawn_consumer, BusError, BusResult, ConsumerConfig, EventBus, InMemoryBus, NatsBus, RetryConfig,
};
use platform_contracts::USER_REGISTRATIONS_QUEUE;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{BusType, Config, StoreType};
use crate::db;
use crate::error::UserError;
use crate::events::{EventPublisher, RegistrationHandler};
use crate::jwt::JwtKeys;
use crate::manager::UserManager;
use crate::metrics::Metrics;
use crate::password::PasswordPolicy;
use crate::repos::{InMemoryUserRepository, PgUserRepository, UserRepository};

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("broker connection failed: {0}")]
    Broker(#[from] BusError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("admin seed failed: {0}")]
    AdminSeed(#[from] UserError),

    #[error("{0}")]
    Config(String),
}

pub struct AppContainer {
    pub config: Config,
    pub bus: Arc<dyn EventBus>,
    pub repo: Arc<dyn UserRepository>,
    pub manager: Arc<UserManager>,
    pub metrics: Metrics,
    pub jwt: JwtKeys,
}

impl AppContainer {
    /// Connect the broker, then the store.
    ///
    /// A broker that stays unreachable for the whole retry budget is fatal.
    /// If the store fails after the broker connected, the broker is closed
    /// before the error is returned. The configured admin, if any, is seeded
    /// last.
    pub async fn init(config: Config) -> Result<Self, InitError> {
        let metrics = Metrics::new()?;
        let bus = build_bus(&config);

        tracing::info!(bus_type = ?config.bus_type, "Connecting to broker");
        bus.connect().await?;
        metrics.dep_up.with_label_values(&["broker"]).set(1);

        let repo = match build_repo(&config).await {
            Ok(repo) => repo,
            Err(e) => {
                if let Err(close_err) = bus.close().await {
                    tracing::warn!(error = %close_err, "Failed to close broker after init failure");
                }
                return Err(e);
            }
        };
        metrics.dep_up.with_label_values(&["store"]).set(1);

        let container = Self::with_parts(config, bus, repo, metrics);
        if let Some(seed) = &container.config.admin {
            if let Err(e) = container.manager.ensure_admin(seed).await {
                container.close().await;
                return Err(e.into());
            }
        }
        Ok(container)
    }

    /// Assemble a container from already-built parts
    pub fn with_parts(
        config: Config,
        bus: Arc<dyn EventBus>,
        repo: Arc<dyn UserRepository>,
        metrics: Metrics,
    ) -> Self {
        let events = EventPublisher::new(bus.clone(), config.service_name.clone(), metrics.clone())
            .with_deadline(config.publish_deadline);
        let passwords = PasswordPolicy {
            memory_kb: config.argon_memory_kb,
            iterations: config.argon_iterations,
            parallelism: config.argon_parallelism,
        };
        let manager = Arc::new(UserManager::new(repo.clone(), events, passwords));
        let jwt = JwtKeys::from_secret(&config.jwt_secret);

        Self {
            config,
            bus,
            repo,
            manager,
            metrics,
            jwt,
        }
    }

    /// Start the `user.registrations` consumer
    pub fn start_consumers(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<BusResult<()>> {
        let config = ConsumerConfig::new(USER_REGISTRATIONS_QUEUE)
            .with_max_deliveries(self.config.consumer_max_deliveries)
            .with_reconnect_delay(self.config.broker_connect_delay);
        let handler = Arc::new(RegistrationHandler::new(self.manager.clone(), self.metrics.clone()));

        spawn_consumer(self.bus.clone(), config, handler, shutdown)
    }

    /// Release the broker and the store
    pub async fn close(&self) {
        if let Err(e) = self.bus.close().await {
            tracing::warn!(error = %e, "Error closing broker connection");
        }
        self.repo.close().await;
        tracing::info!("Container closed");
    }
}

fn build_bus(config: &Config) -> Arc<dyn EventBus> {
    let retry = RetryConfig::fixed(config.broker_connect_attempts, config.broker_connect_delay);
    match config.bus_type {
        BusType::Nats => Arc::new(NatsBus::with_retry_config(
            config.nats_url.clone(),
            config.service_name.clone(),
            retry,
        )),
        BusType::InMemory => Arc::new(InMemoryBus::with_retry_config(retry)),
    }
}

async fn build_repo(config: &Config) -> Result<Arc<dyn UserRepository>, InitError> {
    match config.store_type {
        StoreType::InMemory => Ok(Arc::new(InMemoryUserRepository::new())),
        StoreType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| InitError::Config("DATABASE_URL is not set".to_string()))?;
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");
            Ok(Arc::new(PgUserRepository::new(pool)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminSeed;
    use std::time::Duration;

    fn test_config() -> Config {
        Config {
            service_name: "users".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            bus_type: BusType::InMemory,
            nats_url: String::new(),
            broker_connect_attempts: 2,
            broker_connect_delay: Duration::from_millis(10),
            consumer_max_deliveries: 3,
            publish_deadline: Duration::from_millis(200),
            store_type: StoreType::InMemory,
            database_url: None,
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_minutes: 30,
            admin: None,
            argon_memory_kb: 1024,
            argon_iterations: 1,
            argon_parallelism: 1,
        }
    }

    #[tokio::test]
    async fn test_init_with_in_memory_parts() {
        let container = AppContainer::init(test_config()).await.unwrap();
        assert!(container.bus.is_connected());
        container.close().await;
        assert!(!container.bus.is_connected());
    }

    #[tokio::test]
    async fn test_init_seeds_configured_admin() {
        let config = Config {
            admin: Some(AdminSeed {
                username: "root".to_string(),
                email: "root@example.com".to_string(),
                password: "pw".to_string(),
            }),
            ..test_config()
        };

        let container = AppContainer::init(config).await.unwrap();
        let admin = container.manager.get_user_by_username("root").await.unwrap().unwrap();
        assert!(admin.is_admin());
        container.close().await;
    }

    #[tokio::test]
    async fn test_init_fails_without_database_url() {
        let config = Config {
            store_type: StoreType::Postgres,
            database_url: None,
            ..test_config()
        };

        let err = AppContainer::init(config).await.err().unwrap();
        assert!(matches!(err, InitError::Config(_)));
    }
}
