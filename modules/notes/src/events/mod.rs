pub mod consumer;
pub mod handlers;

pub use consumer::UserEventsHandler;
pub use handlers::{Outcome, UserEventHandlers};
