pub mod auth;
pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod processed;
pub mod repos;
pub mod routes;

pub use container::AppContainer;
pub use error::NoteError;
pub use manager::NoteManager;
