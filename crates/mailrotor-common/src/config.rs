//! Configuration for mailrotor

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Delivery configuration
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Transport configuration
    #[serde(default)]
    pub transports: TransportsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in logs and default HELO
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Delivery (picker, quota, worker) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Application base URL, rewritten to the tracking domain in bodies
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// TTL for cached quota counters, in seconds
    #[serde(default = "default_quota_cache_ttl")]
    pub quota_cache_ttl_secs: u64,

    /// Timeout for acquiring a quota lock, in milliseconds. Acquisition
    /// failure is treated as zero remaining quota.
    #[serde(default = "default_quota_lock_timeout")]
    pub quota_lock_timeout_ms: u64,

    /// Upper bound on picker iterations within a single call
    #[serde(default = "default_picker_max_attempts")]
    pub picker_max_attempts: u32,

    /// Servers tried per delivery before giving up
    #[serde(default = "default_send_attempts")]
    pub send_attempts: u32,

    /// Transactional worker poll interval, in seconds
    #[serde(default = "default_worker_interval")]
    pub worker_interval_secs: u64,

    /// Transactional emails fetched per worker tick
    #[serde(default = "default_worker_batch")]
    pub worker_batch_size: i64,

    /// Usage rows older than this many days keep a pending-delete server
    /// from being hard-deleted
    #[serde(default = "default_purge_retention")]
    pub purge_retention_days: i64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            app_url: default_app_url(),
            quota_cache_ttl_secs: default_quota_cache_ttl(),
            quota_lock_timeout_ms: default_quota_lock_timeout(),
            picker_max_attempts: default_picker_max_attempts(),
            send_attempts: default_send_attempts(),
            worker_interval_secs: default_worker_interval(),
            worker_batch_size: default_worker_batch(),
            purge_retention_days: default_purge_retention(),
        }
    }
}

fn default_app_url() -> String {
    "http://localhost".to_string()
}

fn default_quota_cache_ttl() -> u64 {
    300
}

fn default_quota_lock_timeout() -> u64 {
    2000
}

fn default_picker_max_attempts() -> u32 {
    10
}

fn default_send_attempts() -> u32 {
    3
}

fn default_worker_interval() -> u64 {
    5
}

fn default_worker_batch() -> i64 {
    25
}

fn default_purge_retention() -> i64 {
    7
}

/// Transport registry configuration. A disabled transport (or one missing
/// its endpoint) is removed from the available set at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportsConfig {
    /// Outbound HTTP timeout for provider APIs, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub smtp_enabled: bool,

    #[serde(default = "default_true")]
    pub mailgun_enabled: bool,

    /// Mailgun API base, e.g. "https://api.mailgun.net/v3"
    #[serde(default = "default_mailgun_url")]
    pub mailgun_api_url: String,

    #[serde(default = "default_true")]
    pub postal_enabled: bool,

    #[serde(default = "default_true")]
    pub sparkpost_enabled: bool,

    #[serde(default = "default_sparkpost_url")]
    pub sparkpost_api_url: String,

    #[serde(default = "default_true")]
    pub postmark_enabled: bool,

    #[serde(default = "default_postmark_url")]
    pub postmark_api_url: String,

    #[serde(default = "default_true")]
    pub elasticemail_enabled: bool,

    #[serde(default = "default_elasticemail_url")]
    pub elasticemail_api_url: String,
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            smtp_enabled: true,
            mailgun_enabled: true,
            mailgun_api_url: default_mailgun_url(),
            postal_enabled: true,
            sparkpost_enabled: true,
            sparkpost_api_url: default_sparkpost_url(),
            postmark_enabled: true,
            postmark_api_url: default_postmark_url(),
            elasticemail_enabled: true,
            elasticemail_api_url: default_elasticemail_url(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_mailgun_url() -> String {
    "https://api.mailgun.net/v3".to_string()
}

fn default_sparkpost_url() -> String {
    "https://api.sparkpost.com/api/v1".to_string()
}

fn default_postmark_url() -> String {
    "https://api.postmarkapp.com".to_string()
}

fn default_elasticemail_url() -> String {
    "https://api.elasticemail.com/v4".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailrotor/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
