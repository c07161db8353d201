//! Configuration module for the sponsorship backend.
//!
//! Process configuration is loaded from environment variables with sensible defaults.
//! Organization settings (name, email transport) live in the `settings` table instead.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Path to the directory search index
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// Error raised when an environment variable holds an unusable value.
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("SPONSOR_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("SPONSOR_DB_PATH")
            .unwrap_or_else(|_| "./data/sponsorship.sqlite".to_string())
            .into();

        let index_path = env::var("SPONSOR_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let raw_addr =
            env::var("SPONSOR_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError(format!("invalid SPONSOR_BIND_ADDR: {}", raw_addr)))?;

        let log_level = env::var("SPONSOR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Both cases share one test so parallel tests never race on the environment.
    #[test]
    fn test_config_from_env() {
        env::remove_var("SPONSOR_API_PSK");
        env::remove_var("SPONSOR_DB_PATH");
        env::remove_var("SPONSOR_INDEX_PATH");
        env::remove_var("SPONSOR_BIND_ADDR");
        env::remove_var("SPONSOR_LOG_LEVEL");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/sponsorship.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");

        env::set_var("SPONSOR_BIND_ADDR", "not-an-address");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("SPONSOR_BIND_ADDR"));
        env::remove_var("SPONSOR_BIND_ADDR");
    }
}
