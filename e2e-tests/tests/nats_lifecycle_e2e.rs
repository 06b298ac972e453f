//! User lifecycle propagation over a real NATS JetStream server
//!
//! Requires NATS with JetStream enabled (`nats-server -js`). `NATS_URL`
//! defaults to nats://localhost:4222.
//!
//! Run with: cargo test -p e2e-tests --test nats_lifecycle_e2e -- --ignored --test-threads=1

mod common;

use common::{eventually, Platform};
use event_bus::{NatsBus, RetryConfig};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use users_rs::models::UserCreate;

fn nats_bus(service: &str) -> Arc<NatsBus> {
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    Arc::new(NatsBus::with_retry_config(
        url,
        service,
        RetryConfig::fixed(5, Duration::from_millis(200)),
    ))
}

#[tokio::test]
#[serial]
#[ignore] // Requires NATS JetStream
async fn test_lifecycle_over_nats() {
    common::init_tracing();
    let platform = Platform::start(nats_bus("users"), nats_bus("notes"));

    let suffix = std::process::id();
    let user = platform
        .users
        .manager
        .register_user(UserCreate {
            username: format!("nats-user-{}", suffix),
            email: format!("nats-{}@example.com", suffix),
            password: Some("pw".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    let notes = platform.notes.manager.clone();
    let user_id = user.id.clone();
    assert!(
        eventually(Duration::from_secs(10), || {
            let notes = notes.clone();
            let user_id = user_id.clone();
            async move { notes.get_notes_by_user(&user_id).await.unwrap().len() == 1 }
        })
        .await,
        "welcome note never appeared"
    );

    platform.users.manager.delete_user(&user.id).await.unwrap();
    assert!(
        eventually(Duration::from_secs(10), || {
            let notes = notes.clone();
            let user_id = user_id.clone();
            async move { notes.get_notes_by_user(&user_id).await.unwrap().is_empty() }
        })
        .await,
        "notes were not removed"
    );

    platform.shutdown().await;
}
