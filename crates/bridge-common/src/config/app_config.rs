//! Application configuration structs
//!
//! Loads configuration from environment variables, honoring a `.env`
//! file when present. Invalid values are rejected at load time, never
//! silently clamped.

use serde::Deserialize;
use std::env;

/// Main bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub app: AppSettings,
    pub coap: ListenerConfig,
    pub target: TargetConfig,
    pub sessions: SessionLimits,
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

/// CoAP listener configuration (the request/response transport)
#[derive(Debug, Clone, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_coap_port")]
    pub port: u16,
}

impl ListenerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Duplex transport target (the WebSocket peer)
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// `ws://` or `wss://` URL of the backend
    pub url: String,
}

/// Session lifecycle limits
#[derive(Debug, Clone, Deserialize)]
pub struct SessionLimits {
    /// Maximum concurrent sessions; must be a positive integer
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// How long a session may stay pending before establishment fails
    #[serde(default = "default_establish_timeout_ms")]
    pub establish_timeout_ms: u64,
}

// Default value functions
fn default_app_name() -> String {
    "coap-ws-bridge".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_coap_port() -> u16 {
    5683
}

fn default_max_sessions() -> usize {
    64
}

fn default_establish_timeout_ms() -> u64 {
    10_000
}

impl BridgeConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let max_sessions = parse_var("MAX_SESSIONS", default_max_sessions())?;
        if max_sessions == 0 {
            return Err(ConfigError::InvalidValue("MAX_SESSIONS", "0".to_string()));
        }

        let establish_timeout_ms =
            parse_var("ESTABLISH_TIMEOUT_MS", default_establish_timeout_ms())?;
        if establish_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "ESTABLISH_TIMEOUT_MS",
                "0".to_string(),
            ));
        }

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
            coap: ListenerConfig {
                host: env::var("COAP_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("COAP_PORT", default_coap_port())?,
            },
            target: TargetConfig {
                url: env::var("TARGET_URL").map_err(|_| ConfigError::MissingVar("TARGET_URL"))?,
            },
            sessions: SessionLimits {
                max_sessions,
                establish_timeout_ms,
            },
        })
    }
}

/// Configuration for the standalone CoAP→HTTP forwarding proxy
#[derive(Debug, Clone, Deserialize)]
pub struct HttpProxyConfig {
    pub coap: ListenerConfig,
    /// HTTP base URL requests are forwarded to
    pub target_url: String,
}

impl HttpProxyConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            coap: ListenerConfig {
                host: env::var("COAP_HOST").unwrap_or_else(|_| default_host()),
                port: parse_var("COAP_PORT", default_coap_port())?,
            },
            target_url: env::var("HTTP_TARGET_URL")
                .map_err(|_| ConfigError::MissingVar("HTTP_TARGET_URL"))?,
        })
    }
}

/// Parse an optional environment variable, falling back to a default
///
/// A variable that is present but unparseable is an error, not a fallback.
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(default),
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
