//! The `user.events` consumer task running against the in-memory broker

mod common;

use event_bus::{EventBus, EventEnvelope};
use notes_rs::models::NoteCreate;
use platform_contracts::{UserEvent, USER_EVENTS_QUEUE, WELCOME_NOTE_TITLE};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

fn created(user_id: &str) -> Vec<u8> {
    EventEnvelope::new(
        "users",
        UserEvent::UserCreated {
            user_id: user_id.to_string(),
            username: user_id.to_string(),
            email: format!("{}@example.com", user_id),
        },
    )
    .to_bytes()
    .unwrap()
}

fn deleted(user_id: &str) -> Vec<u8> {
    EventEnvelope::new(
        "users",
        UserEvent::UserDeleted {
            user_id: user_id.to_string(),
        },
    )
    .to_bytes()
    .unwrap()
}

async fn drain(bus: &event_bus::InMemoryBus, queue: &str) {
    timeout(Duration::from_secs(5), async {
        while bus.depth(queue) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue was not drained");
}

#[tokio::test]
async fn test_welcome_note_and_cascade_delete() {
    let (container, bus) = common::container();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = container.start_consumers(shutdown_rx);

    bus.publish(USER_EVENTS_QUEUE, created("u1")).await.unwrap();
    // Same user announced again with a fresh event id
    bus.publish(USER_EVENTS_QUEUE, created("u1")).await.unwrap();
    drain(&bus, USER_EVENTS_QUEUE).await;

    let notes = container.manager.get_notes_by_user("u1").await.unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, WELCOME_NOTE_TITLE);

    for title in ["one", "two"] {
        container
            .manager
            .create_note(
                NoteCreate {
                    title: title.to_string(),
                    content: String::new(),
                },
                "u1",
            )
            .await
            .unwrap();
    }
    assert_eq!(container.manager.get_notes_by_user("u1").await.unwrap().len(), 3);

    bus.publish(USER_EVENTS_QUEUE, deleted("u1")).await.unwrap();
    drain(&bus, USER_EVENTS_QUEUE).await;
    assert!(container.manager.get_notes_by_user("u1").await.unwrap().is_empty());

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), consumer).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_and_poison_messages_do_not_block_the_queue() {
    let (container, bus) = common::container();
    bus.publish(USER_EVENTS_QUEUE, br#"{"event_type":"user.unknown","user_id":"u1"}"#.to_vec())
        .await
        .unwrap();
    bus.publish(USER_EVENTS_QUEUE, br#"{"event_type":"user.created"}"#.to_vec())
        .await
        .unwrap();
    bus.publish(USER_EVENTS_QUEUE, created("u2")).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = container.start_consumers(shutdown_rx);
    drain(&bus, USER_EVENTS_QUEUE).await;

    assert!(container.manager.get_notes_by_user("u1").await.unwrap().is_empty());
    assert_eq!(container.manager.get_notes_by_user("u2").await.unwrap().len(), 1);
    assert_eq!(bus.depth(&format!("{}.dlq", USER_EVENTS_QUEUE)), 1);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), consumer).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_consumer_resumes_after_broker_outage() {
    let (container, bus) = common::container();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = container.start_consumers(shutdown_rx);

    bus.publish(USER_EVENTS_QUEUE, created("u1")).await.unwrap();
    drain(&bus, USER_EVENTS_QUEUE).await;

    bus.set_available(false);
    tokio::time::sleep(Duration::from_millis(20)).await;
    bus.set_available(true);

    // A separate client publishes while the consumer reconnects
    let publisher = bus.connection();
    publisher.publish(USER_EVENTS_QUEUE, created("u2")).await.unwrap();
    drain(&bus, USER_EVENTS_QUEUE).await;

    assert_eq!(container.manager.get_notes_by_user("u2").await.unwrap().len(), 1);

    shutdown_tx.send(true).unwrap();
    timeout(Duration::from_secs(5), consumer).await.unwrap().unwrap().unwrap();
}
