//! Process settings from the environment.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    /// Absent: serve from the in-memory datastore.
    pub database_url: Option<String>,
    pub config_path: Option<PathBuf>,
    pub body_limit_bytes: usize,
}

impl Settings {
    /// Reads BIND_ADDR, DATABASE_URL, CONFIG_PATH, BODY_LIMIT_BYTES.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind = non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .map_err(|e| ConfigError::Validation(format!("BIND_ADDR '{}': {}", bind, e)))?;
        let body_limit_bytes = match non_empty("BODY_LIMIT_BYTES") {
            Some(v) => v
                .parse()
                .map_err(|e| ConfigError::Validation(format!("BODY_LIMIT_BYTES '{}': {}", v, e)))?,
            None => DEFAULT_BODY_LIMIT_BYTES,
        };
        Ok(Settings {
            bind_addr,
            database_url: non_empty("DATABASE_URL"),
            config_path: non_empty("CONFIG_PATH").map(PathBuf::from),
            body_limit_bytes,
        })
    }
}
