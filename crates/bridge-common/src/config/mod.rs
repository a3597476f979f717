//! Configuration loading

mod app_config;

pub use app_config::{
    AppSettings, BridgeConfig, ConfigError, Environment, HttpProxyConfig, ListenerConfig,
    SessionLimits, TargetConfig,
};
