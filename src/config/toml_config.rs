//! TOML Configuration with Environment Variable Overrides
//!
//! Every field is optional; missing sections fall back to defaults.
//! `SCREEN_WATCH_*` variables override the file.

use crate::capture::{CaptureMode, ComparisonConfig, Region};
use crate::config::server::ServerConfig;
use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_PREFIX: &str = "SCREEN_WATCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
    Test,
}

impl Environment {
    /// Real screen capture only in production
    pub fn capture_mode(&self) -> CaptureMode {
        match self {
            Environment::Production => CaptureMode::Production,
            Environment::Development | Environment::Test => CaptureMode::Synthetic,
        }
    }
}

impl FromStr for Environment {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "development" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            other => Err(WatchError::Config(format!("unknown environment '{}'", other))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub comparison: ComparisonConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_region")]
    pub region: Region,
    #[serde(default = "default_fallback_region")]
    pub fallback_region: Region,
    #[serde(default = "default_synthetic_change_interval")]
    pub synthetic_change_interval: u32,
    #[serde(default)]
    pub synthetic_seed: Option<u64>,
}

fn default_region() -> Region {
    Region::new(725, 243, 593, 736)
}
fn default_fallback_region() -> Region {
    Region::new(100, 100, 800, 600)
}
fn default_synthetic_change_interval() -> u32 {
    5
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            fallback_region: default_fallback_region(),
            synthetic_change_interval: default_synthetic_change_interval(),
            synthetic_seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 {
    2000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug-logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            debug_dir: default_debug_dir(),
        }
    }
}

impl WatchConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push("screen-watch");
        path.push("config.toml");
        path
    }

    /// Read `path` (or the default location), then apply environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        let config = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let config = Self::from_toml(&contents)?;
            tracing::info!("Loaded TOML config from {:?}", path);
            config
        } else {
            tracing::debug!("No config file at {:?}; using defaults", path);
            Self::default()
        };

        let config = apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| WatchError::Config(format!("invalid config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.comparison.validate()?;
        if self.monitor.interval_ms == 0 {
            return Err(WatchError::Config("monitor.interval_ms must be positive".to_string()));
        }
        if self.capture.synthetic_change_interval == 0 {
            return Err(WatchError::Config(
                "capture.synthetic_change_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.environment.capture_mode()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.monitor.interval_ms)
    }

    /// The region to watch; the fallback when the primary has no area.
    pub fn capture_region(&self) -> Region {
        if self.capture.region.has_area() {
            return self.capture.region;
        }
        tracing::warn!(
            "Configured region {} has no area; using fallback {}",
            self.capture.region,
            self.capture.fallback_region
        );
        self.capture.fallback_region
    }

    /// Where debug artifacts go, if debug mode is on
    pub fn debug_dir(&self) -> Option<&Path> {
        self.logging.debug.then_some(self.logging.debug_dir.as_path())
    }
}

pub fn apply_env_overrides(config: WatchConfig) -> Result<WatchConfig> {
    apply_env_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`. Empty values are ignored.
pub fn apply_env_overrides_from<F>(mut config: WatchConfig, lookup: F) -> Result<WatchConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| {
        lookup(&format!("{}_{}", ENV_PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(env) = var("ENV") {
        config.environment = env.parse()?;
    }

    if let Some(interval) = var("INTERVAL_MS") {
        config.monitor.interval_ms = parse_var("INTERVAL_MS", &interval)?;
    }

    if let Some(threshold) = var("THRESHOLD") {
        config.comparison.threshold = parse_var("THRESHOLD", &threshold)?;
    }

    if let Some(min) = var("MIN_CHANGED_PIXELS") {
        config.comparison.min_changed_pixels = parse_var("MIN_CHANGED_PIXELS", &min)?;
    }

    if let Some(debug) = var("DEBUG") {
        config.logging.debug = debug == "true" || debug == "1";
    }

    if let Some(port) = var("PORT") {
        config.server.port = parse_var("PORT", &port)?;
    }

    Ok(config)
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value.parse().map_err(|e| {
        WatchError::Config(format!("{}_{}={:?}: {}", ENV_PREFIX, name, value, e))
    })
}
