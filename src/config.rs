// src/config.rs

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use dotenvy::dotenv;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Lifetime (seconds) of tokens signed by this service.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub server_addr: SocketAddr,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    /// Deadline applied to every scoring/statistics operation.
    pub operation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 3600),
            rust_log,
            server_addr: parse_or("SERVER_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000))),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", 5),
            db_acquire_timeout: Duration::from_secs(parse_or("DB_ACQUIRE_TIMEOUT_SECS", 3)),
            operation_timeout: Duration::from_millis(parse_or("OPERATION_TIMEOUT_MS", 5000)),
        }
    }
}

/// Reads `name` and parses it, falling back to `default` when the variable is
/// missing or malformed. Malformed values are logged so a typo doesn't go unnoticed.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Invalid configuration value, using default");
            default
        }),
        Err(_) => default,
    }
}
