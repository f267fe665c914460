//! TOML configuration for linesight.
//!
//! Layered: an explicit path (`--config` / `LINESIGHT_CONFIG`), then the
//! standard system location, then compiled-in defaults. Every section is
//! optional and falls back to its defaults field by field.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::DEFAULT_CAPACITY;
use crate::trend::DEFAULT_TREND_POINTS;

/// Standard system location for the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/linesight/linesight.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "LINESIGHT_CONFIG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window.capacity must be at least 1")]
    ZeroCapacity,
    #[error("window.trend_points must be at least 1")]
    ZeroTrendPoints,
    #[error("reconnect.initial_delay_ms ({initial}) exceeds reconnect.max_delay_ms ({max})")]
    BackoffRange { initial: u64, max: u64 },
    #[error("upstream.live_url must use ws:// or wss:// (got {0:?})")]
    LiveScheme(String),
    #[error("upstream.base_url must use http:// or https:// (got {0:?})")]
    HttpScheme(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the dashboard core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinesightConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// A config file that was passed over in favour of the next layer.
#[derive(Debug)]
pub struct SkippedConfig {
    pub path: PathBuf,
    pub error: anyhow::Error,
}

/// Outcome of layered discovery. Nothing has been logged yet, so the caller
/// reports it with [`DiscoveredConfig::log`] once a subscriber is installed.
#[derive(Debug)]
pub struct DiscoveredConfig {
    pub config: LinesightConfig,
    /// File the config came from; `None` means compiled-in defaults.
    pub source: Option<PathBuf>,
    pub skipped: Vec<SkippedConfig>,
}

impl DiscoveredConfig {
    pub fn log(&self) {
        for skipped in &self.skipped {
            warn!(
                path = %skipped.path.display(),
                error = %format!("{:#}", skipped.error),
                "config file could not be loaded, falling back"
            );
        }
        match &self.source {
            Some(path) => info!(path = %path.display(), "loaded linesight configuration"),
            None => debug!("no usable config file, using compiled-in defaults"),
        }
    }
}

impl LinesightConfig {
    /// Read and validate a TOML file without logging.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        info!(path = %path.display(), "loaded linesight configuration");
        Ok(config)
    }

    /// Try `$LINESIGHT_CONFIG`, then [`SYSTEM_CONFIG_PATH`], then defaults,
    /// logging any file that was skipped.
    pub fn load_or_default() -> Self {
        let discovered = Self::discover();
        discovered.log();
        discovered.config
    }

    /// Layered lookup over the standard locations, without logging.
    pub fn discover() -> DiscoveredConfig {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::discover_from(env_path, Path::new(SYSTEM_CONFIG_PATH))
    }

    /// Layered lookup: `env_path` if given, then `system_path` if it exists,
    /// then defaults.
    pub fn discover_from(env_path: Option<PathBuf>, system_path: &Path) -> DiscoveredConfig {
        let mut skipped = Vec::new();

        if let Some(path) = env_path {
            match Self::read(&path) {
                Ok(config) => {
                    return DiscoveredConfig {
                        config,
                        source: Some(path),
                        skipped,
                    }
                }
                Err(error) => skipped.push(SkippedConfig { path, error }),
            }
        }

        if system_path.exists() {
            match Self::read(system_path) {
                Ok(config) => {
                    return DiscoveredConfig {
                        config,
                        source: Some(system_path.to_path_buf()),
                        skipped,
                    }
                }
                Err(error) => skipped.push(SkippedConfig {
                    path: system_path.to_path_buf(),
                    error,
                }),
            }
        }

        DiscoveredConfig {
            config: Self::default(),
            source: None,
            skipped,
        }
    }

    /// Reject values the core cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.window.trend_points == 0 {
            return Err(ConfigError::ZeroTrendPoints);
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::BackoffRange {
                initial: self.reconnect.initial_delay_ms,
                max: self.reconnect.max_delay_ms,
            });
        }
        let live = &self.upstream.live_url;
        if !(live.starts_with("ws://") || live.starts_with("wss://")) {
            return Err(ConfigError::LiveScheme(live.clone()));
        }
        let base = &self.upstream.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::HttpScheme(base.clone()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// Where the snapshot and the live feed come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the results API.
    pub base_url: String,
    /// Path of the historical results list, relative to `base_url`.
    pub results_path: String,
    /// Path of the server-side counters, relative to `base_url`.
    pub metrics_path: String,
    /// Full WebSocket URL of the live feed.
    pub live_url: String,
    /// Per-request timeout for the snapshot fetch (seconds).
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            results_path: "/results".to_string(),
            metrics_path: "/metrics".to_string(),
            live_url: "ws://localhost:8000/ws/live".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn results_url(&self) -> String {
        join_url(&self.base_url, &self.results_path)
    }

    pub fn metrics_url(&self) -> String {
        join_url(&self.base_url, &self.metrics_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum number of results held in memory.
    pub capacity: usize,
    /// Number of trend samples exposed to the chart.
    pub trend_points: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            trend_points: DEFAULT_TREND_POINTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

/// Live feed reconnection. Off by default: one connection attempt per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    /// Delay before the first retry (milliseconds).
    pub initial_delay_ms: u64,
    /// Upper bound for the doubling delay (milliseconds).
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind address of the read API.
    pub listen_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:8090".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
