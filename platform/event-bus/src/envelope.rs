//! # Event Envelope
//!
//! Wire format for lifecycle events: a flat JSON object whose `event_type`
//! field selects the variant, plus optional metadata.
//!
//! ## Envelope Fields
//!
//! - `event_type`: discriminator, one of the closed set of the event enum
//! - `event_id`: unique identifier used as idempotency key
//! - `occurred_at`: RFC 3339 timestamp when the event was generated
//! - `source_module`: service that produced the event
//! - `schema_version`: payload schema version, defaults to 1
//!
//! Only `event_type` and the variant's own fields are required on decode,
//! so producers that send the bare event keep working.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Namespace for idempotency keys derived from envelopes without an `event_id`.
const IDEMPOTENCY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d0e_8b3a_4c5e_9f7d_1a2b_3c4d_5e6f);

/// A closed set of event types carried on one queue.
///
/// Implementors are serde enums tagged with `#[serde(tag = "event_type")]`.
pub trait EventKind: Serialize + DeserializeOwned {
    /// Every `event_type` value the enum can decode
    const KNOWN_TYPES: &'static [&'static str];

    fn event_type(&self) -> &'static str;
}

/// Envelope wrapping one event of type `T`
///
/// # Examples
///
/// ```rust
/// use event_bus::{EventEnvelope, EventKind};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// #[serde(tag = "event_type")]
/// enum AccountEvent {
///     #[serde(rename = "account.closed")]
///     Closed { account_id: String },
/// }
///
/// impl EventKind for AccountEvent {
///     const KNOWN_TYPES: &'static [&'static str] = &["account.closed"];
///     fn event_type(&self) -> &'static str {
///         "account.closed"
///     }
/// }
///
/// let envelope = EventEnvelope::new("accounts", AccountEvent::Closed {
///     account_id: "acc_1".to_string(),
/// });
/// let bytes = envelope.to_bytes().unwrap();
/// assert!(String::from_utf8(bytes).unwrap().contains(r#""event_type":"account.closed""#));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_module: Option<String>,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(flatten)]
    pub event: T,
}

fn default_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope with a fresh event_id and occurred_at
    pub fn new(source_module: impl Into<String>, event: T) -> Self {
        Self {
            event_id: Some(Uuid::new_v4()),
            occurred_at: Some(Utc::now()),
            source_module: Some(source_module.into()),
            schema_version: CURRENT_SCHEMA_VERSION,
            event,
        }
    }

    /// Envelope carrying only the event, as older producers send it
    pub fn bare(event: T) -> Self {
        Self {
            event_id: None,
            occurred_at: None,
            source_module: None,
            schema_version: CURRENT_SCHEMA_VERSION,
            event,
        }
    }

    pub fn with_event_id(mut self, event_id: Uuid) -> Self {
        self.event_id = Some(event_id);
        self
    }
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))
    }

    /// Key under which consumers record that this event was applied.
    ///
    /// The `event_id` when present, otherwise a UUIDv5 over the event body so
    /// redeliveries of the same bare envelope map to the same key.
    pub fn idempotency_key(&self) -> Uuid {
        match self.event_id {
            Some(id) => id,
            None => {
                let body = serde_json::to_vec(&self.event).unwrap_or_default();
                Uuid::new_v5(&IDEMPOTENCY_NAMESPACE, &body)
            }
        }
    }
}

/// Result of decoding a payload against a closed event set
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Known(EventEnvelope<T>),
    /// Well-formed envelope whose `event_type` is outside the set
    Unknown { event_type: String },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EnvelopeError {
    #[error("payload is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("envelope has no string event_type")]
    MissingEventType,

    #[error("invalid {event_type} event: {reason}")]
    InvalidEvent { event_type: String, reason: String },
}

/// Decode a raw payload into an envelope of `T`.
///
/// Unknown `event_type` values are not an error; they come back as
/// [`Decoded::Unknown`] so the caller can acknowledge and skip them.
pub fn decode_event<T: EventKind>(payload: &[u8]) -> Result<Decoded<T>, EnvelopeError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;

    let event_type = match value.get("event_type") {
        Some(serde_json::Value::String(s)) => s.clone(),
        _ if value.is_object() => return Err(EnvelopeError::MissingEventType),
        _ => return Err(EnvelopeError::InvalidJson("expected an object".to_string())),
    };

    if !T::KNOWN_TYPES.contains(&event_type.as_str()) {
        return Ok(Decoded::Unknown { event_type });
    }

    serde_json::from_value::<EventEnvelope<T>>(value)
        .map(Decoded::Known)
        .map_err(|e| EnvelopeError::InvalidEvent {
            event_type,
            reason: e.to_string(),
        })
}
