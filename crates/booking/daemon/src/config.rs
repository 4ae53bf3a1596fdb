//! Configuration for bookingd

use booking_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Engine tunables (slot offset, timer polling, action timeout)
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            enable_cors: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Periodic maintenance trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_maintenance_interval")]
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_maintenance_interval(),
        }
    }
}

/// Where notifications go
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationsConfig {
    /// Log instead of delivering (development)
    #[default]
    Log,

    /// Signed HTTP delivery to a notification gateway
    Http {
        endpoint: String,
        shared_secret: String,

        #[serde(default = "default_notification_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_maintenance_interval() -> u64 {
    24 * 60 * 60
}

fn default_notification_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Layer defaults, an optional file, and `BOOKING_` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // BOOKING_ENGINE__SLOT_UTC_OFFSET_HOURS=-8
        builder = builder.add_source(
            config::Environment::with_prefix("BOOKING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(matches!(config.notifications, NotificationsConfig::Log));
        assert_eq!(config.engine.slot_utc_offset_hours, 7);
        assert!(config.maintenance.enabled);
        assert_eq!(config.maintenance.interval_secs, 86_400);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.engine.timer_poll_interval_secs, 30);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_tagged_sections_deserialize() {
        let json = serde_json::json!({
            "storage": {"type": "postgres", "url": "postgres://localhost/bookings"},
            "notifications": {
                "type": "http",
                "endpoint": "https://notify.internal",
                "shared_secret": "s3cret"
            },
            "engine": {"slot_utc_offset_hours": -8}
        });
        let config: DaemonConfig = serde_json::from_value(json).unwrap();

        match config.storage {
            StorageConfig::Postgres {
                max_connections,
                connect_timeout_secs,
                ..
            } => {
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            other => panic!("unexpected storage {other:?}"),
        }
        assert!(matches!(
            config.notifications,
            NotificationsConfig::Http { timeout_secs: 10, .. }
        ));
        assert_eq!(config.engine.slot_utc_offset_hours, -8);
        assert_eq!(config.engine.action_timeout_secs, 60);
    }
}
