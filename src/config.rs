use anyhow::{bail, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    #[allow(dead_code)]
    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    #[allow(dead_code)]
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Which storage backend backs the thread store, notification store, and
/// routing/bid gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local store. Dev and test runs.
    Memory,
    /// PostgreSQL. The production single point of truth.
    Postgres,
}

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Storage
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Push channel
    pub event_bus_capacity: usize,
    pub heartbeat_interval_seconds: u64,

    // Delivery fallback cadence
    pub heartbeat_timeout_seconds: u64,
    pub message_poll_interval_seconds: u64,
    pub notification_poll_interval_seconds: u64,
    pub reconnect_interval_seconds: u64,
    pub poll_failure_threshold: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Storage
        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => bail!("Unknown STORE_BACKEND: {other}"),
        };
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }
        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Push channel
        let event_bus_capacity = env::var("EVENT_BUS_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1024);
        let heartbeat_interval_seconds = env::var("HEARTBEAT_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        // Delivery fallback cadence
        let heartbeat_timeout_seconds = env::var("HEARTBEAT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15); // three missed heartbeats
        let message_poll_interval_seconds = env::var("MESSAGE_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let notification_poll_interval_seconds = env::var("NOTIFICATION_POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let reconnect_interval_seconds = env::var("RECONNECT_INTERVAL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);
        let poll_failure_threshold = env::var("POLL_FAILURE_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        Ok(Settings {
            env,
            server_addr,
            store_backend,
            database_url,
            database_max_connections,
            cors_allow_origins,
            event_bus_capacity,
            heartbeat_interval_seconds,
            heartbeat_timeout_seconds,
            message_poll_interval_seconds,
            notification_poll_interval_seconds,
            reconnect_interval_seconds,
            poll_failure_threshold,
        })
    }
}
