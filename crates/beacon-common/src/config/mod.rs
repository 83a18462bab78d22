//! Configuration loading

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, ConfigError, Environment, JwtConfig, LimitsConfig, LivenessConfig,
    NotificationsConfig, ServerConfig,
};
