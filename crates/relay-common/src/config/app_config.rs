//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: GatewaySettings,
    pub backoff: BackoffSettings,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
    /// Force JSON log output
    #[serde(default)]
    pub log_json: bool,
    /// File holding one gateway token per line
    #[serde(default = "default_tokens_file")]
    pub tokens_file: PathBuf,
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

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Read timeout while waiting for HELLO
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Round-trip budget subtracted from the heartbeat interval
    #[serde(default = "default_heartbeat_margin_ms")]
    pub heartbeat_margin_ms: u64,
    /// Ack latency above which a warning is logged
    #[serde(default = "default_latency_warn_ms")]
    pub latency_warn_ms: u64,
    /// Maximum WebSocket frame / message size
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_jitter_ms")]
    pub jitter_ms: u64,
    /// Reset the attempt counter after this long in steady state (unset: never)
    #[serde(default)]
    pub stable_reset_secs: Option<u64>,
}

// Default value functions
fn default_app_name() -> String {
    "relay-gateway".to_string()
}

fn default_tokens_file() -> PathBuf {
    PathBuf::from("etc/tokens.txt")
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?encoding=json&v=9&compress=zlib-stream".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_margin_ms() -> u64 {
    5_000
}

fn default_latency_warn_ms() -> u64 {
    10_000
}

fn default_max_frame_bytes() -> usize {
    2_621_440 // 2.5 MiB
}

fn default_max_reconnects() -> u32 {
    10
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_backoff_jitter_ms() -> u64 {
    1_000
}

/// Parse an optional numeric variable, rejecting garbage instead of silently defaulting.
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

fn parse_flag(name: &'static str) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name, raw)),
        },
        Err(_) => Ok(false),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let env = match env::var("APP_ENV") {
            Ok(raw) => Environment::parse(&raw).ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            Err(_) => Environment::default(),
        };

        let config = Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env,
                log_json: parse_flag("LOG_JSON")?,
                tokens_file: env::var("RELAY_TOKENS_FILE")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_tokens_file()),
            },
            gateway: GatewaySettings {
                url: env::var("RELAY_GATEWAY_URL").unwrap_or_else(|_| default_gateway_url()),
                handshake_timeout_ms: parse_var("RELAY_HANDSHAKE_TIMEOUT_MS")?
                    .unwrap_or_else(default_handshake_timeout_ms),
                heartbeat_margin_ms: parse_var("RELAY_HEARTBEAT_MARGIN_MS")?
                    .unwrap_or_else(default_heartbeat_margin_ms),
                latency_warn_ms: parse_var("RELAY_LATENCY_WARN_MS")?
                    .unwrap_or_else(default_latency_warn_ms),
                max_frame_bytes: parse_var("RELAY_MAX_FRAME_BYTES")?
                    .unwrap_or_else(default_max_frame_bytes),
            },
            backoff: BackoffSettings {
                max_reconnects: parse_var("RELAY_MAX_RECONNECTS")?
                    .unwrap_or_else(default_max_reconnects),
                base_ms: parse_var("RELAY_BACKOFF_BASE_MS")?.unwrap_or_else(default_backoff_base_ms),
                max_ms: parse_var("RELAY_BACKOFF_MAX_MS")?.unwrap_or_else(default_backoff_max_ms),
                jitter_ms: parse_var("RELAY_BACKOFF_JITTER_MS")?
                    .unwrap_or_else(default_backoff_jitter_ms),
                stable_reset_secs: parse_var("RELAY_STABLE_RESET_SECS")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gateway.url.starts_with("ws://") && !self.gateway.url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "RELAY_GATEWAY_URL",
                self.gateway.url.clone(),
            ));
        }
        if self.backoff.max_reconnects == 0 {
            return Err(ConfigError::InvalidValue("RELAY_MAX_RECONNECTS", "0".to_string()));
        }
        if self.backoff.max_ms < self.backoff.base_ms {
            return Err(ConfigError::InvalidValue(
                "RELAY_BACKOFF_MAX_MS",
                self.backoff.max_ms.to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            heartbeat_margin_ms: default_heartbeat_margin_ms(),
            latency_warn_ms: default_latency_warn_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            max_reconnects: default_max_reconnects(),
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
            jitter_ms: default_backoff_jitter_ms(),
            stable_reset_secs: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
