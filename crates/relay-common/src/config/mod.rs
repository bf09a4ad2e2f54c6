//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, BackoffSettings, ConfigError, Environment, GatewaySettings,
};
