//! Shared fixtures for users-rs integration tests

use event_bus::InMemoryBus;
use std::sync::Arc;
use std::time::Duration;
use users_rs::config::{BusType, Config, StoreType};
use users_rs::metrics::Metrics;
use users_rs::repos::InMemoryUserRepository;
use users_rs::AppContainer;

pub const JWT_SECRET: &str = "integration-secret";

pub fn test_config() -> Config {
    Config {
        service_name: "users".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        bus_type: BusType::InMemory,
        nats_url: String::new(),
        broker_connect_attempts: 3,
        broker_connect_delay: Duration::from_millis(10),
        consumer_max_deliveries: 3,
        publish_deadline: Duration::from_millis(200),
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

pub fn container() -> (Arc<AppContainer>, InMemoryBus) {
    let bus = InMemoryBus::new();
    let container = Arc::new(AppContainer::with_parts(
        test_config(),
        Arc::new(bus.clone()),
        Arc::new(InMemoryUserRepository::new()),
        Metrics::new().unwrap(),
    ));
    (container, bus)
}
