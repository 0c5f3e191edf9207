//! Process configuration from the environment

use crate::error::{AppError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const HOST_VAR: &str = "PRICE_TRACKER_HOST";
pub const PORT_VAR: &str = "PRICE_TRACKER_PORT";
pub const DATA_DIR_VAR: &str = "PRICE_TRACKER_DATA_DIR";

/// SQLite file name inside the data directory
pub const DATABASE_FILE: &str = "price_history.db";

/// Where the API listens and where data lives
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl ServerConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(HOST_VAR).filter(|v| !v.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(port) = lookup(PORT_VAR).filter(|v| !v.trim().is_empty()) {
            config.port = port.trim().parse().map_err(|_| {
                AppError::Config(format!("{} must be a port number, got {:?}", PORT_VAR, port))
            })?;
        }

        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|v| !v.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address: {}", e)))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().unwrap().port(), 8000);
        assert_eq!(config.database_path(), PathBuf::from("./data/price_history.db"));
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (HOST_VAR, "0.0.0.0"),
            (PORT_VAR, "9090"),
            (DATA_DIR_VAR, "/var/lib/tracker"),
        ]))
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/tracker/price_history.db"));
    }

    #[test]
    fn test_invalid_port() {
        let result = ServerConfig::from_lookup(lookup(&[(PORT_VAR, "eighty")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_host() {
        let config = ServerConfig::from_lookup(lookup(&[(HOST_VAR, "not a host")])).unwrap();
        assert!(matches!(config.socket_addr(), Err(AppError::Config(_))));
    }
}
