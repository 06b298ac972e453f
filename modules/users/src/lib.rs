pub mod config;
pub mod container;
pub mod db;
pub mod error;
pub mod events;
pub mod jwt;
pub mod manager;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repos;
pub mod routes;

pub use container::AppContainer;
pub use error::UserError;
pub use manager::UserManager;
