use event_bus::{EventEnvelope, EventKind};
use serde::{Deserialize, Serialize};

/// User lifecycle events. `event_type` on the wire selects the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum UserEvent {
    #[serde(rename = "user.created")]
    UserCreated {
        user_id: String,
        username: String,
        email: String,
    },

    #[serde(rename = "user.deleted")]
    UserDeleted { user_id: String },
}

pub type UserEventEnvelope = EventEnvelope<UserEvent>;

impl UserEvent {
    pub const CREATED: &'static str = "user.created";
    pub const DELETED: &'static str = "user.deleted";

    pub fn user_id(&self) -> &str {
        match self {
            UserEvent::UserCreated { user_id, .. } | UserEvent::UserDeleted { user_id } => user_id,
        }
    }
}

impl EventKind for UserEvent {
    const KNOWN_TYPES: &'static [&'static str] = &[UserEvent::CREATED, UserEvent::DELETED];

    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => UserEvent::CREATED,
            UserEvent::UserDeleted { .. } => UserEvent::DELETED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{decode_event, Decoded};

    #[test]
    fn test_wire_format_matches_contract() {
        let envelope = EventEnvelope::new(
            "users",
            UserEvent::UserCreated {
                user_id: "u1".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
            },
        );
        let value: serde_json::Value = serde_json::from_slice(&envelope.to_bytes().unwrap()).unwrap();

        assert_eq!(value["event_type"], "user.created");
        assert_eq!(value["user_id"], "u1");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["email"], "alice@example.com");
    }

    #[test]
    fn test_decodes_bare_deleted_event() {
        let payload = br#"{"event_type":"user.deleted","user_id":"u7"}"#;
        match decode_event::<UserEvent>(payload).unwrap() {
            Decoded::Known(envelope) => {
                assert_eq!(envelope.event.event_type(), "user.deleted");
                assert_eq!(envelope.event.user_id(), "u7");
            }
            other => panic!("expected user.deleted, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_user_event_is_reported_not_rejected() {
        let payload = br#"{"event_type":"user.unknown","user_id":"u7"}"#;
        assert_eq!(
            decode_event::<UserEvent>(payload).unwrap(),
            Decoded::Unknown {
                event_type: "user.unknown".to_string()
            }
        );
    }
}
