//! Configuration system for spa-agent
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Engine policy (`TrackerConfig`) and harvest settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent settings
    pub agent: AgentSettings,

    /// Correlation engine policy
    pub tracker: TrackerConfig,

    /// Harvest settings
    pub harvest: HarvestSettings,
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// How network requests are attributed to an interaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AjaxAttribution {
    /// A request holds its interaction open until it resolves
    #[default]
    Continuation,
    /// A request attaches while the interaction is open but does not hold it open
    Span,
}

impl fmt::Display for AjaxAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AjaxAttribution::Continuation => write!(f, "continuation"),
            AjaxAttribution::Span => write!(f, "span"),
        }
    }
}

impl FromStr for AjaxAttribution {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continuation" => Ok(AjaxAttribution::Continuation),
            "span" => Ok(AjaxAttribution::Span),
            other => Err(ConfigError::ValidationError(format!(
                "Invalid ajax attribution: {}. Must be one of: [\"continuation\", \"span\"]",
                other
            ))),
        }
    }
}

/// Late-request resurrection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResurrectionSettings {
    pub enabled: bool,

    /// How long after its end a finished interaction may still be reopened (ms)
    pub window_ms: f64,
}

impl Default for ResurrectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 0.0,
        }
    }
}

/// Correlation engine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Per-frame timer budget; arming a timer costs its delay (ms)
    pub timer_budget_ms: f64,

    /// Cap on nodes in one interaction tree
    pub max_nodes_per_interaction: usize,

    pub ajax_attribution: AjaxAttribution,

    pub resurrection: ResurrectionSettings,

    /// Longest a finalized interaction waits for attached requests (ms)
    pub settle_timeout_ms: f64,

    /// Count hash-only URL changes as route changes
    pub track_hash_changes: bool,

    /// Produce a node for every attached timer
    pub trace_timers: bool,

    /// DOM event kinds that open an interaction
    pub ui_events: Vec<String>,

    /// Create the boot-time initial page load interaction
    pub initial_page_load: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timer_budget_ms: 999.0,
            max_nodes_per_interaction: 128,
            ajax_attribution: AjaxAttribution::Continuation,
            resurrection: ResurrectionSettings::default(),
            settle_timeout_ms: 30_000.0,
            track_hash_changes: true,
            trace_timers: false,
            ui_events: ["click", "submit", "keypress", "keydown", "keyup", "change"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            initial_page_load: true,
        }
    }
}

impl TrackerConfig {
    pub fn qualifies(&self, event_kind: &str) -> bool {
        self.ui_events.iter().any(|k| k == event_kind)
    }
}

/// Harvest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    /// Drain interval in milliseconds
    pub interval_ms: u64,

    /// Output file path for the JSONL exporter
    pub path: String,

    /// Maximum records held per buffer before the oldest are dropped
    pub max_items: usize,

    /// Append to an existing output file
    pub append: bool,

    /// Pretty print JSON
    pub pretty: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            path: "spa-harvest.jsonl".to_string(),
            max_items: 1000,
            append: true,
            pretty: false,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. SPA_AGENT_CONFIG environment variable
    /// 3. ~/.config/spa-agent/config.toml
    /// 4. /etc/spa-agent/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<AgentConfig> {
        let config_path = self.find_config_file()?;

        let mut config = if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            Self::load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            AgentConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        Self::validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use. A path given on the command line must exist.
    fn find_config_file(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(ConfigError::NotFound(path.clone()));
        }

        if let Ok(env_path) = std::env::var("SPA_AGENT_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            warn!("SPA_AGENT_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Ok(Some(path));
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/spa-agent/config.toml");
            if path.exists() {
                return Ok(Some(path));
            }
        }

        Ok(None)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<AgentConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AgentConfig) -> ConfigResult<()> {
        if let Ok(val) = std::env::var("SPA_LOG_LEVEL") {
            config.agent.log_level = val;
        }

        if let Ok(val) = std::env::var("SPA_TIMER_BUDGET_MS") {
            if let Ok(budget) = val.parse() {
                config.tracker.timer_budget_ms = budget;
            } else {
                warn!("Ignoring unparsable SPA_TIMER_BUDGET_MS: {}", val);
            }
        }
        if let Ok(val) = std::env::var("SPA_AJAX_ATTRIBUTION") {
            config.tracker.ajax_attribution = val.parse()?;
        }
        if let Ok(val) = std::env::var("SPA_RESURRECTION_ENABLED") {
            config.tracker.resurrection.enabled =
                val.parse().unwrap_or(config.tracker.resurrection.enabled);
        }

        if let Ok(val) = std::env::var("SPA_HARVEST_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                config.harvest.interval_ms = interval;
            }
        }
        if let Ok(val) = std::env::var("SPA_HARVEST_PATH") {
            config.harvest.path = val;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(config: &AgentConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.agent.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.agent.log_level, valid_levels
            )));
        }

        let tracker = &config.tracker;
        if tracker.timer_budget_ms.is_nan() || tracker.timer_budget_ms <= 0.0 {
            return Err(ConfigError::ValidationError(
                "timer_budget_ms must be greater than 0".to_string(),
            ));
        }
        if tracker.max_nodes_per_interaction == 0 {
            return Err(ConfigError::ValidationError(
                "max_nodes_per_interaction cannot be 0".to_string(),
            ));
        }
        if tracker.resurrection.window_ms.is_nan() || tracker.resurrection.window_ms < 0.0 {
            return Err(ConfigError::ValidationError(
                "resurrection.window_ms cannot be negative".to_string(),
            ));
        }
        if tracker.settle_timeout_ms.is_nan() || tracker.settle_timeout_ms < 0.0 {
            return Err(ConfigError::ValidationError(
                "settle_timeout_ms cannot be negative".to_string(),
            ));
        }

        if config.harvest.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Harvest interval cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &AgentConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("spa-agent").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
