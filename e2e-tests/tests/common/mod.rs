//! Wiring for cross-service tests: both services in one process, each with
//! its own client connection to a shared broker.

use event_bus::{BusResult, EventBus, InMemoryBus, RetryConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const JWT_SECRET: &str = "e2e-secret";
const CONNECT_DELAY: Duration = Duration::from_millis(20);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn users_config() -> users_rs::config::Config {
    use users_rs::config::{BusType, Config, StoreType};
    Config {
        service_name: "users".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        bus_type: BusType::InMemory,
        nats_url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
        broker_connect_attempts: 5,
        broker_connect_delay: CONNECT_DELAY,
        consumer_max_deliveries: 3,
        publish_deadline: Duration::from_secs(2),
        store_type: StoreType::InMemory,
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
        access_token_ttl_minutes: 30,
        admin: None,
        argon_memory_kb: 1024,
        argon_iterations: 1,
        argon_parallelism: 1,
    }
}

pub fn notes_config() -> notes_rs::config::Config {
    use notes_rs::config::{BusType, Config, StoreType};
    Config {
        service_name: "notes".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        bus_type: BusType::InMemory,
        nats_url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
        broker_connect_attempts: 5,
        broker_connect_delay: CONNECT_DELAY,
        consumer_max_deliveries: 3,
        store_type: StoreType::InMemory,
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
    }
}

/// Both services running their consumers until [`Platform::shutdown`]
pub struct Platform {
    pub users: Arc<users_rs::AppContainer>,
    pub notes: Arc<notes_rs::AppContainer>,
    shutdown_tx: watch::Sender<bool>,
    consumers: Vec<JoinHandle<BusResult<()>>>,
}

impl Platform {
    pub fn start(users_bus: Arc<dyn EventBus>, notes_bus: Arc<dyn EventBus>) -> Self {
        let users = Arc::new(users_rs::AppContainer::with_parts(
            users_config(),
            users_bus,
            Arc::new(users_rs::repos::InMemoryUserRepository::new()),
            users_rs::metrics::Metrics::new().unwrap(),
        ));
        let notes = Arc::new(notes_rs::AppContainer::with_parts(
            notes_config(),
            notes_bus,
            Arc::new(notes_rs::repos::InMemoryNoteRepository::new()),
            Arc::new(notes_rs::processed::InMemoryProcessedEvents::new()),
            notes_rs::metrics::Metrics::new().unwrap(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumers = vec![
            users.start_consumers(shutdown_rx.clone()),
            notes.start_consumers(shutdown_rx),
        ];

        Self {
            users,
            notes,
            shutdown_tx,
            consumers,
        }
    }

    /// Two clients of one fresh in-memory broker; the broker handle is
    /// returned for outage simulation and queue inspection
    pub fn in_memory() -> (Self, InMemoryBus) {
        let broker = InMemoryBus::with_retry_config(RetryConfig::fixed(5, CONNECT_DELAY));
        let platform = Self::start(Arc::new(broker.connection()), Arc::new(broker.connection()));
        (platform, broker)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for consumer in self.consumers {
            let result = tokio::time::timeout(Duration::from_secs(5), consumer)
                .await
                .expect("consumer did not stop after shutdown")
                .expect("consumer task panicked");
            assert!(result.is_ok(), "consumer stopped with error: {:?}", result);
        }
        self.users.close().await;
        self.notes.close().await;
    }
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
