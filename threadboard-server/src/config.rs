//! Board configuration - environment loading
//!
//! Configuration is loaded from environment variables:
//! - `STORAGE_TYPE`: `inmemory` (default) or `postgres`
//! - `DATABASE_URL`: Postgres connection string (required for `postgres`)
//! - `POSTGRES_MAX_CONN`: pool size (default: 10)
//! - `READ_TIMEOUT_MS` / `WRITE_TIMEOUT_MS`: per-operation deadlines (default: 5000)
//! - `SERVER_ADDR`: bind address (default: 127.0.0.1:8080)
//! - `SUBSCRIBER_BUFFER`: per-subscriber channel capacity (default: 64)

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default bind address for the HTTP server
pub const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Which storage engine backs the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    #[default]
    InMemory,
    Postgres,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InMemory => "inmemory",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!("unknown storage type '{other}'")),
        }
    }
}

/// Deadlines applied to relational storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
        }
    }
}

/// Board configuration
#[derive(Debug, Clone)]
pub struct BoardConfig {
    pub storage: StorageKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub timeouts: Timeouts,
    pub bind_addr: SocketAddr,
    /// Comments buffered per live subscriber before new ones are dropped
    pub subscriber_buffer: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::InMemory,
            database_url: None,
            max_connections: 10,
            timeouts: Timeouts::default(),
            bind_addr: SocketAddr::from(DEFAULT_ADDR),
            subscriber_buffer: 64,
        }
    }
}

impl BoardConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source (for testing)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let storage = parse_var(&lookup, "STORAGE_TYPE")?.unwrap_or(defaults.storage);
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let max_connections =
            parse_var(&lookup, "POSTGRES_MAX_CONN")?.unwrap_or(defaults.max_connections);
        let read = parse_var::<u64, _>(&lookup, "READ_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeouts.read);
        let write = parse_var::<u64, _>(&lookup, "WRITE_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeouts.write);
        let bind_addr = parse_var(&lookup, "SERVER_ADDR")?.unwrap_or(defaults.bind_addr);
        let subscriber_buffer =
            parse_var(&lookup, "SUBSCRIBER_BUFFER")?.unwrap_or(defaults.subscriber_buffer);

        if subscriber_buffer == 0 {
            return Err(ConfigError::Invalid {
                var: "SUBSCRIBER_BUFFER",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        Ok(Self {
            storage,
            database_url,
            max_connections,
            timeouts: Timeouts { read, write },
            bind_addr,
            subscriber_buffer,
        })
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}
