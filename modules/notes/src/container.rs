//! Composition root for the notes service

use event_bus::{
    spawn_consumer, BusError, BusResult, ConsumerConfig, EventBus, InMemoryBus, NatsBus, RetryConfig,
};
use platform_contracts::USER_EVENTS_QUEUE;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::TokenVerifier;
use crate::config::{BusType, Config, StoreType};
use crate::db;
use crate::events::{UserEventHandlers, UserEventsHandler};
use crate::manager::NoteManager;
use crate::metrics::Metrics;
use crate::processed::{InMemoryProcessedEvents, PgProcessedEvents, ProcessedEvents};
use crate::repos::{InMemoryNoteRepository, NoteRepository, PgNoteRepository};

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

    #[error("{0}")]
    Config(String),
}

pub struct AppContainer {
    pub config: Config,
    pub bus: Arc<dyn EventBus>,
    pub repo: Arc<dyn NoteRepository>,
    pub processed: Arc<dyn ProcessedEvents>,
    pub manager: Arc<NoteManager>,
    pub metrics: Metrics,
    pub tokens: TokenVerifier,
}

impl AppContainer {
    /// Connect the broker, then the store. The broker is closed again if the
    /// store cannot be brought up.
    pub async fn init(config: Config) -> Result<Self, InitError> {
        let metrics = Metrics::new()?;
        let bus = build_bus(&config);

        tracing::info!(bus_type = ?config.bus_type, "Connecting to broker");
        bus.connect().await?;
        metrics.dep_up.with_label_values(&["broker"]).set(1);

        let (repo, processed) = match build_stores(&config).await {
            Ok(stores) => stores,
            Err(e) => {
                if let Err(close_err) = bus.close().await {
                    tracing::warn!(error = %close_err, "Failed to close broker after init failure");
                }
                return Err(e);
            }
        };
        metrics.dep_up.with_label_values(&["store"]).set(1);

        Ok(Self::with_parts(config, bus, repo, processed, metrics))
    }

    pub fn with_parts(
        config: Config,
        bus: Arc<dyn EventBus>,
        repo: Arc<dyn NoteRepository>,
        processed: Arc<dyn ProcessedEvents>,
        metrics: Metrics,
    ) -> Self {
        let manager = Arc::new(NoteManager::new(repo.clone()));
        let tokens = TokenVerifier::from_secret(&config.jwt_secret);

        Self {
            config,
            bus,
            repo,
            processed,
            manager,
            metrics,
            tokens,
        }
    }

    /// Start the `user.events` consumer
    pub fn start_consumers(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<BusResult<()>> {
        let config = ConsumerConfig::new(USER_EVENTS_QUEUE)
            .with_max_deliveries(self.config.consumer_max_deliveries)
            .with_reconnect_delay(self.config.broker_connect_delay);
        let handlers = UserEventHandlers::new(self.manager.clone(), self.processed.clone());
        let handler = Arc::new(UserEventsHandler::new(handlers, self.metrics.clone()));

        spawn_consumer(self.bus.clone(), config, handler, shutdown)
    }

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

type Stores = (Arc<dyn NoteRepository>, Arc<dyn ProcessedEvents>);

async fn build_stores(config: &Config) -> Result<Stores, InitError> {
    match config.store_type {
        StoreType::InMemory => Ok((
            Arc::new(InMemoryNoteRepository::new()),
            Arc::new(InMemoryProcessedEvents::new()),
        )),
        StoreType::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| InitError::Config("DATABASE_URL is not set".to_string()))?;
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");
            Ok((
                Arc::new(PgNoteRepository::new(pool.clone())),
                Arc::new(PgProcessedEvents::new(pool)),
            ))
        }
    }
}
