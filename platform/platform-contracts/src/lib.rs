//! # Platform Contracts
//!
//! Queue names and event types exchanged between the users and notes
//! services. Both sides depend on this crate so a renamed field or a new
//! event type is a compile error rather than a runtime decode failure.

mod user_events;

pub use user_events::{UserEvent, UserEventEnvelope};

/// Lifecycle events produced by the users service, consumed by notes.
pub const USER_EVENTS_QUEUE: &str = "user.events";

/// `user.created` events replayed into the users service itself, so every
/// instance can materialize a registration that happened elsewhere.
pub const USER_REGISTRATIONS_QUEUE: &str = "user.registrations";

/// Title of the note created for every new user
pub const WELCOME_NOTE_TITLE: &str = "Welcome!";

pub const WELCOME_NOTE_CONTENT: &str =
    "Welcome to your notes! This is your first note. Edit it, or delete it and start writing your own.";
