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

/// First administrator, created at startup when no user holds the name
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl AdminSeed {
    /// `ADMIN_USERNAME` turns seeding on; `ADMIN_PASSWORD` is then required.
    pub fn from_env() -> Result<Option<Self>, String> {
        let Ok(username) = env::var("ADMIN_USERNAME") else {
            return Ok(None);
        };
        let password = env::var("ADMIN_PASSWORD")
            .map_err(|_| "ADMIN_PASSWORD must be set when ADMIN_USERNAME is".to_string())?;
        let email = env::var("ADMIN_EMAIL").unwrap_or_else(|_| format!("{}@localhost", username));
        Ok(Some(Self {
            username,
            email,
            password,
        }))
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
    /// Upper bound on publishing one event after commit, reconnects included
    pub publish_deadline: Duration,

    pub store_type: StoreType,
    pub database_url: Option<String>,

    pub jwt_secret: String,
    pub access_token_ttl_minutes: i64,
    pub admin: Option<AdminSeed>,

    pub argon_memory_kb: u32,
    pub argon_iterations: u32,
    pub argon_parallelism: u32,
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
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "users".to_string()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", "8001")?,

            bus_type,
            nats_url: env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            broker_connect_attempts: parse_var("BROKER_CONNECT_ATTEMPTS", "5")?,
            broker_connect_delay: Duration::from_millis(parse_var("BROKER_CONNECT_DELAY_MS", "5000")?),
            consumer_max_deliveries: parse_var("CONSUMER_MAX_DELIVERIES", "5")?,
            publish_deadline: Duration::from_millis(parse_var("PUBLISH_DEADLINE_MS", "5000")?),

            store_type,
            database_url,

            jwt_secret,
            access_token_ttl_minutes: parse_var("ACCESS_TOKEN_TTL_MINUTES", "30")?,
            admin: AdminSeed::from_env()?,

            argon_memory_kb: parse_var("ARGON_MEMORY_KB", "19456")?,
            argon_iterations: parse_var("ARGON_ITERATIONS", "2")?,
            argon_parallelism: parse_var("ARGON_PARALLELISM", "1")?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("{} must be a valid {}", name, std::any::type_name::<T>()))
}
