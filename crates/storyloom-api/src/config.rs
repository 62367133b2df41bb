//! Gateway configuration from the environment.

use std::time::Duration;

use storyloom_rounds::coordinator::CoordinatorConfig;

use crate::error::AppError;

/// Typed view of the gateway's environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Postgres connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Bind host (`HOST`, default `0.0.0.0`).
    pub host: String,
    /// Bind port (`PORT`, default `3000`).
    pub port: u16,
    /// Disconnect grace in seconds (`DISCONNECT_GRACE_SECONDS`, default 10).
    pub disconnect_grace_seconds: u64,
    /// Idle-user eviction threshold in seconds (`IDLE_USER_SECONDS`,
    /// default 300).
    pub idle_user_seconds: i64,
}

impl GatewayConfig {
    /// Reads the configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `DATABASE_URL` is missing or a
    /// numeric variable fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL environment variable must be set".into()))?;
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_owned());
        let port = parse_var("PORT", 3000)?;
        let disconnect_grace_seconds = parse_var("DISCONNECT_GRACE_SECONDS", 10)?;
        let idle_user_seconds = parse_var("IDLE_USER_SECONDS", 300)?;
        Ok(Self {
            database_url,
            host,
            port,
            disconnect_grace_seconds,
            idle_user_seconds,
        })
    }

    /// The presence tunables handed to the coordinator.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            disconnect_grace: Duration::from_secs(self.disconnect_grace_seconds),
            idle_after: chrono::Duration::seconds(self.idle_user_seconds),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{name} must be a valid number"))),
        Err(_) => Ok(default),
    }
}
