//! Configuration for WACM

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// WhatsApp Cloud API configuration
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    /// Campaign dispatch tuning
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Storage backend: "memory" or "postgres"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "memory".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
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

/// API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Static API token; when unset the API is open
    pub auth_token: Option<String>,

    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// WhatsApp Cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Graph API base URL including the version segment
    #[serde(default = "default_graph_url")]
    pub api_base_url: String,

    /// Sender phone number id (seeds the settings record)
    pub phone_number_id: Option<String>,

    /// Permanent or system-user access token (seeds the settings record)
    pub access_token: Option<String>,

    /// WhatsApp Business account id
    pub business_account_id: Option<String>,

    /// Token expected in webhook subscription challenges
    pub webhook_verify_token: Option<String>,

    /// App secret used to verify `X-Hub-Signature-256`
    pub app_secret: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_graph_url(),
            phone_number_id: None,
            access_token: None,
            business_account_id: None,
            webhook_verify_token: None,
            app_secret: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_graph_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Campaign dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum sends in flight per campaign run
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay between consecutive sends in milliseconds
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            send_delay_ms: default_send_delay_ms(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_send_delay_ms() -> u64 {
    1000
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between reconciliation passes in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Timezone applied to schedules that do not name one
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the first file found, then apply environment overrides
    pub fn load() -> crate::Result<Self> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var("WACM_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("./config.toml"));
        paths.push(PathBuf::from("/etc/wacm/config.toml"));

        let mut config = None;
        for path in paths {
            if path.exists() {
                config = Some(Self::from_file(&path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            warn!("No configuration file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Override secrets and endpoints from the environment
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("WACM_DATABASE_URL") {
            self.database.url = Some(url);
            self.database.backend = "postgres".to_string();
        }
        if let Some(token) = lookup("WACM_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(token);
        }
        if let Some(secret) = lookup("WACM_WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret);
        }
        if let Some(token) = lookup("WACM_API_TOKEN") {
            self.api.auth_token = Some(token);
        }
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> crate::Result<()> {
        match self.database.backend.as_str() {
            "memory" => {}
            "postgres" if self.database.url.is_some() => {}
            "postgres" => {
                return Err(crate::Error::Config(
                    "Database URL required for PostgreSQL".to_string(),
                ))
            }
            other => {
                return Err(crate::Error::Config(format!(
                    "Unsupported database backend: {}",
                    other
                )))
            }
        }

        if self.dispatch.concurrency == 0 {
            return Err(crate::Error::Config(
                "dispatch.concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
