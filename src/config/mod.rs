/// Configuration management for the Caseway engine
///
/// Handles server binding, database location, the SLA scan schedule, and the
/// optional notification webhook.

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// SLA monitor configuration
    pub sla: SlaConfig,
    /// Notifier configuration
    pub notify: NotifyConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the SQLite database file (default: "data")
    pub data_dir: String,
}

/// SLA monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Cron schedule for the breach scan (default: every 5 minutes)
    pub scan_schedule: String,
}

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook endpoint for outgoing notifications; unset means drop them
    pub webhook_url: Option<String>,
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("CASEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("CASEWAY_PORT")
                    .unwrap_or_else(|_| "3007".to_string())
                    .parse()
                    .unwrap_or(3007),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("CASEWAY_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
            },
            sla: SlaConfig {
                scan_schedule: std::env::var("CASEWAY_SLA_SCAN_SCHEDULE")
                    .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            },
            notify: NotifyConfig {
                webhook_url: std::env::var("CASEWAY_NOTIFY_WEBHOOK").ok(),
            },
        }
    }
}
