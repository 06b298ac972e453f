pub mod publisher;
pub mod registrations;

pub use publisher::EventPublisher;
pub use registrations::RegistrationHandler;
