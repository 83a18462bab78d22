//! Application configuration structs
//!
//! Loads configuration from environment variables.

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: ServerConfig,
    pub limits: LimitsConfig,
    pub liveness: LivenessConfig,
    pub notifications: NotificationsConfig,
    pub jwt: JwtConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Gateway listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection quota configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LimitsConfig {
    /// Per-user connection cap; admitting past it evicts the oldest
    #[serde(default = "default_max_per_user")]
    pub max_connections_per_user: usize,
    /// Global connection cap; new sockets past it are rejected outright
    #[serde(default = "default_max_total")]
    pub max_total_connections: usize,
}

/// Heartbeat and sweep timing configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LivenessConfig {
    /// Ping period per connection
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Registry-wide sweep period
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Inactivity ceiling enforced by the sweep
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Window a fresh socket has to complete the auth handshake
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: u64,
}

/// Notification push configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct NotificationsConfig {
    /// Size of the recent-notifications slice in `notification_update`
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

/// JWT configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64,
}

// Default value functions
fn default_app_name() -> String {
    "beacon".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_max_per_user() -> usize {
    5
}

fn default_max_total() -> usize {
    10_000
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_auth_timeout() -> u64 {
    30
}

fn default_recent_limit() -> usize {
    10
}

fn default_access_token_expiry() -> i64 {
    900 // 15 minutes
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {key}: {value}")]
    InvalidVar { key: &'static str, value: String },
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidVar { key, value: raw }),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    /// or unparseable
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: ServerConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("GATEWAY_PORT", default_port())?,
            },
            limits: LimitsConfig {
                max_connections_per_user: parse_var(
                    "MAX_CONNECTIONS_PER_USER",
                    default_max_per_user(),
                )?,
                max_total_connections: parse_var("MAX_TOTAL_CONNECTIONS", default_max_total())?,
            },
            liveness: LivenessConfig {
                heartbeat_interval_secs: parse_var(
                    "HEARTBEAT_INTERVAL_SECS",
                    default_heartbeat_interval(),
                )?,
                sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", default_sweep_interval())?,
                idle_timeout_secs: parse_var("IDLE_TIMEOUT_SECS", default_idle_timeout())?,
                auth_timeout_secs: parse_var("AUTH_TIMEOUT_SECS", default_auth_timeout())?,
            },
            notifications: NotificationsConfig {
                recent_limit: parse_var("NOTIFICATION_RECENT_LIMIT", default_recent_limit())?,
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?,
                access_token_expiry: parse_var(
                    "JWT_ACCESS_TOKEN_EXPIRY",
                    default_access_token_expiry(),
                )?,
            },
        })
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: default_max_per_user(),
            max_total_connections: default_max_total(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            sweep_interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
            auth_timeout_secs: default_auth_timeout(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
        }
    }
}
