use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Endpoint receiving a copy of every saved signup. Unset disables notifications.
    pub notify_url: Option<String>,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://careerday.db".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        let notify_url = env::var("SIGNUP_NOTIFY_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            database_url,
            bind_addr,
            notify_url,
            store_timeout: millis_from_env("STORE_TIMEOUT_MS", 5_000)?,
            notify_timeout: millis_from_env("NOTIFY_TIMEOUT_MS", 10_000)?,
        })
    }
}

fn millis_from_env(key: &str, default: u64) -> Result<Duration, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e))),
        Err(_) => Ok(Duration::from_millis(default)),
    }
}
