//! Config module - file and environment configuration

pub mod server;
pub mod toml_config;

// Re-export commonly used types
pub use server::ServerConfig;
pub use toml_config::{
    apply_env_overrides, apply_env_overrides_from, CaptureConfig, Environment, LoggingConfig,
    MonitorConfig, WatchConfig,
};
