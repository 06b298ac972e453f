use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    /// Defaults to `nats`; the in-process broker is only used when asked for.
    pub fn from_env() -> Result<Self, String> {
        let value = env::var("BUS_TYPE").unwrap_or_else(|_| "nats".to_string());
        match value.to_lowercase().as_str() {
            "nats" => Ok(BusType::Nats),
            "inmemory" => Ok(BusType::InMemory),
            _ => Err(format!("Invalid BUS_TYPE: {}. Must be 'nats' or 'inmemory'", value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreType {
    Postgres,
    InMemory,
}

impl StoreType {
    pub fn from_env() -> Result<Self, String> {
        let value = env::var("STORE_TYPE").unwrap_or_else(|_| "postgres".to_string());
        match value.to_lowercase().as_str() {
            "postgres" => Ok(StoreType::Postgres),
            "inmemory" => Ok(StoreType::InMemory),
            _ => Err(format!("Invalid STORE_TYPE: {}. Must be 'postgres' or 'inmemory'", value)),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub host: String,
    pub port: u16,

    pub bus_type: BusType,
    pub nats_url: String,
    pub broker_connect_attempts: u32,
    pub broker_connect_delay: Duration,
    pub consumer_max_deliveries: u32,

    pub store_type: StoreType,
    pub database_url: Option<String>,

    /// Shared with the users service, which issues the tokens
    pub jwt_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = BusType::from_env()?;
        let store_type = StoreType::from_env()?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_type == StoreType::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set when STORE_TYPE=postgres".to_string());
        }

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;

        Ok(Config {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "notes".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", "8002")?,

            bus_type,
            nats_url: env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            broker_connect_attempts: parse_var("BROKER_CONNECT_ATTEMPTS", "5")?,
            broker_connect_delay: Duration::from_millis(parse_var("BROKER_CONNECT_DELAY_MS", "5000")?),
            consumer_max_deliveries: parse_var("CONSUMER_MAX_DELIVERIES", "5")?,

            store_type,
            database_url,

            jwt_secret,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("{} must be a valid {}", name, std::any::type_name::<T>()))
}
