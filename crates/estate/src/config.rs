//! Configuration for the purchase service

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Service configuration, assembled from CLI flags and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Database connection URL (Postgres, MySQL/TiDB or SQLite)
    pub database_url: String,

    /// Listen address for the HTTP server
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Hex-encoded Ed25519 public key of the session token issuer
    pub auth_public_key: String,

    /// Maximum database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Database connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Enable SQL query logging
    #[serde(default)]
    pub enable_sql_logging: bool,

    /// Upper bound on chips bought in a single checkout
    #[serde(default = "default_max_chips_per_purchase")]
    pub max_chips_per_purchase: u32,

    /// Attempts made when selected chips are claimed concurrently
    #[serde(default = "default_claim_retries")]
    pub claim_retries: u32,

    /// Create missing tables and seed the badge catalog on start-up
    #[serde(default)]
    pub bootstrap_schema: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            listen_addr: default_listen_addr(),
            auth_public_key: String::new(),
            max_connections: default_max_connections(),
            connection_timeout_secs: default_connection_timeout(),
            enable_sql_logging: false,
            max_chips_per_purchase: default_max_chips_per_purchase(),
            claim_retries: default_claim_retries(),
            bootstrap_schema: false,
        }
    }
}

/// Limits applied by the purchase workflow
#[derive(Debug, Clone, Copy)]
pub struct PurchaseLimits {
    pub max_chips_per_purchase: u32,
    pub claim_retries: u32,
}

impl Default for PurchaseLimits {
    fn default() -> Self {
        Self {
            max_chips_per_purchase: default_max_chips_per_purchase(),
            claim_retries: default_claim_retries(),
        }
    }
}

impl From<&ServiceConfig> for PurchaseLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            max_chips_per_purchase: config.max_chips_per_purchase,
            claim_retries: config.claim_retries.max(1),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_connections() -> u32 {
    50
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_max_chips_per_purchase() -> u32 {
    1000
}

fn default_claim_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"database_url": "sqlite::memory:", "auth_public_key": "ab"}"#,
        )
        .unwrap();

        assert_eq!(config.max_connections, 50);
        assert_eq!(config.claim_retries, 3);
        assert_eq!(config.max_chips_per_purchase, 1000);
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(!config.bootstrap_schema);
    }

    #[test]
    fn test_limits_never_drop_to_zero_attempts() {
        let config = ServiceConfig {
            claim_retries: 0,
            ..Default::default()
        };
        assert_eq!(PurchaseLimits::from(&config).claim_retries, 1);
    }
}
