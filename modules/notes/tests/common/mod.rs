//! Shared fixtures for notes-rs integration tests

use event_bus::InMemoryBus;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use notes_rs::config::{BusType, Config, StoreType};
use notes_rs::metrics::Metrics;
use notes_rs::processed::InMemoryProcessedEvents;
use notes_rs::repos::InMemoryNoteRepository;
use notes_rs::AppContainer;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

pub const JWT_SECRET: &str = "integration-secret";

pub fn test_config() -> Config {
    Config {
        service_name: "notes".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        bus_type: BusType::InMemory,
        nats_url: String::new(),
        broker_connect_attempts: 3,
        broker_connect_delay: Duration::from_millis(10),
        consumer_max_deliveries: 3,
        store_type: StoreType::InMemory,
        database_url: None,
        jwt_secret: JWT_SECRET.to_string(),
    }
}

pub fn container() -> (Arc<AppContainer>, InMemoryBus) {
    let bus = InMemoryBus::new();
    let container = Arc::new(AppContainer::with_parts(
        test_config(),
        Arc::new(bus.clone()),
        Arc::new(InMemoryNoteRepository::new()),
        Arc::new(InMemoryProcessedEvents::new()),
        Metrics::new().unwrap(),
    ));
    (container, bus)
}

/// An access token as the users service would issue it
pub fn token_for(user_id: &str) -> String {
    let claims = json!({
        "sub": user_id,
        "username": user_id,
        "role": "user",
        "iss": "users-rs",
        "iat": chrono::Utc::now().timestamp(),
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}
