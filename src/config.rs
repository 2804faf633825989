//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `SHADOWTAB_*` environment variable overrides.

use crate::planner::NameScheme;
use crate::shadow::SyncMode;
use crate::sql::Dialect;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub shadow: ShadowConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default)]
    pub dialect: Dialect,
}

fn default_store_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("shadowtab").join("series.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./shadowtab.db".to_string())
}

fn default_busy_timeout() -> u64 {
    5000 // 5 seconds
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout(),
            dialect: Dialect::default(),
        }
    }
}

/// Shadow index configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShadowConfig {
    /// Initial state of the creation gate
    #[serde(default)]
    pub allow_create: bool,

    #[serde(default)]
    pub sync: SyncMode,

    #[serde(default = "default_shadow_suffix")]
    pub suffix: String,
}

fn default_shadow_suffix() -> String {
    "_shadow".to_string()
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            allow_create: false,
            sync: SyncMode::default(),
            suffix: default_shadow_suffix(),
        }
    }
}

/// Query planner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    /// Limits above this stage shadow row identifiers in a temporary relation
    #[serde(default = "default_stage_threshold")]
    pub stage_threshold: u64,

    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,

    #[serde(default)]
    pub names: NameScheme,

    #[serde(default = "default_counter_limit")]
    pub counter_limit: u64,
}

fn default_stage_threshold() -> u64 {
    10_000
}

fn default_temp_prefix() -> String {
    "shadowtmp".to_string()
}

fn default_counter_limit() -> u64 {
    u32::MAX as u64
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            stage_threshold: default_stage_threshold(),
            temp_prefix: default_temp_prefix(),
            names: NameScheme::default(),
            counter_limit: default_counter_limit(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("shadowtab").join("config.toml")),
            Some(PathBuf::from("/etc/shadowtab/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(path) = var("SHADOWTAB_DB") {
            self.store.path = path;
        }
        if let Some(ms) = var("SHADOWTAB_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.store.busy_timeout_ms = ms;
        }
        if let Some(dialect) = var("SHADOWTAB_DIALECT").and_then(|v| Dialect::from_name(&v)) {
            self.store.dialect = dialect;
        }

        // Shadow overrides
        if let Some(allow) = var("SHADOWTAB_ALLOW_CREATE").and_then(|v| parse_bool(&v)) {
            self.shadow.allow_create = allow;
        }
        if let Some(sync) = var("SHADOWTAB_SYNC").and_then(|v| SyncMode::from_name(&v)) {
            self.shadow.sync = sync;
        }

        // Planner overrides
        if let Some(n) = var("SHADOWTAB_STAGE_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.planner.stage_threshold = n;
        }
        if let Some(names) = var("SHADOWTAB_TEMP_NAMES").and_then(|v| NameScheme::from_name(&v)) {
            self.planner.names = names;
        }

        // Logging overrides
        if let Some(level) = var("SHADOWTAB_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("SHADOWTAB_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# shadowtab Configuration
#
# Environment variables override these settings:
# - SHADOWTAB_DB
# - SHADOWTAB_BUSY_TIMEOUT_MS
# - SHADOWTAB_DIALECT
# - SHADOWTAB_ALLOW_CREATE
# - SHADOWTAB_SYNC
# - SHADOWTAB_STAGE_THRESHOLD
# - SHADOWTAB_TEMP_NAMES
# - SHADOWTAB_LOG_LEVEL
# - SHADOWTAB_LOG_FORMAT

[store]
# Database file holding series, catalog and shadow tables
path = "~/.local/share/shadowtab/series.db"

# How long a statement waits on a locked database (ms)
busy_timeout_ms = 5000

# Statement dialect: sqlite (executes) or postgres (render only)
dialect = "sqlite"

[shadow]
# Allow shadow index creation without an explicit enable
allow_create = false

# How shadow rows follow the primary table:
# trigger (store-side) or application (in the record writer)
sync = "trigger"

# Suffix appended to a series name to name its shadow index
suffix = "_shadow"

[planner]
# Non-streaming requests returning more rows than this stage
# shadow row identifiers in a temporary relation first
stage_threshold = 10000

# Prefix for temporary relation names
temp_prefix = "shadowtmp"

# Temporary name source: counter or uuid
names = "counter"

# Names a counter source hands out before reporting overflow
counter_limit = 4294967295

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/shadowtab/shadowtab.log"
"#
    .to_string()
}
