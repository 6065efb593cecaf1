//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/pioe/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use pioe_runtime::{HostOptions, SearchPath};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log levels accepted in `host.log_level` and `--log-level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Scheduler and process settings
    pub host: HostConfig,
    /// Engine lookup and the engines loaded at startup
    #[serde(default)]
    pub engines: EnginesConfig,
    /// Scripts loaded after `init`
    #[serde(default)]
    pub scripts: ScriptsConfig,
}

/// Scheduler and process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Sleep between two scheduler ticks, in milliseconds
    /// Default: 10
    pub frame_resolution_ms: u64,
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
    /// Whether Ctrl+C requests a clean shutdown
    /// Default: true
    #[serde(default = "default_true")]
    pub handle_interrupts: bool,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnginesConfig {
    /// Directories searched for engine libraries, in order.
    /// An empty string defers to the platform's library search path.
    pub search_paths: Vec<PathBuf>,
    /// Engine keys or library paths loaded at startup
    #[serde(default)]
    pub load: Vec<String>,
}

/// Script configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScriptsConfig {
    /// Script files handed to `load_script` after `init`
    #[serde(default)]
    pub load: Vec<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            frame_resolution_ms: 10,
            log_level: "info".to_string(),
            handle_interrupts: true,
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            search_paths: SearchPath::default().directories,
            load: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/pioe/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "pioe", "pioe")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    pub fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    pub fn default_config_content() -> String {
        r#"# pioe host configuration

[host]
# Sleep between two scheduler ticks, in milliseconds
# Default: 10
frame_resolution_ms = 10

# Log level: trace, debug, info, warn, error
# RUST_LOG and --log-level take precedence.
# Default: "info"
log_level = "info"

# Request a clean shutdown on Ctrl+C
# Default: true
handle_interrupts = true

[engines]
# Directories searched for libpioe<key>engine libraries, in order.
# An empty string defers to the platform's library search path.
search_paths = ["./", "./engines/", "./lib/", "../lib/", "../lib/pioe/", ""]

# Engines loaded at startup: keys such as "ruby", or library paths
# starting with "." or "/".
load = []

[scripts]
# Scripts loaded after the engines are initialized. Each one is routed
# to the engine whose script suffix matches its extension.
load = []
"#
        .to_string()
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are valid and within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.host.frame_resolution_ms == 0 {
            anyhow::bail!("host.frame_resolution_ms must be greater than 0");
        }

        validate_log_level(&self.host.log_level)?;

        if self.engines.search_paths.is_empty() {
            anyhow::bail!("engines.search_paths must not be empty");
        }

        Ok(())
    }

    /// Runtime options for a [`pioe_runtime::Host`].
    pub fn host_options(&self) -> HostOptions {
        HostOptions {
            frame_resolution: Duration::from_millis(self.host.frame_resolution_ms),
            search: SearchPath::with_directories(self.engines.search_paths.iter().cloned()),
            handle_interrupts: self.host.handle_interrupts,
        }
    }
}

/// Reject anything but the five standard levels.
pub fn validate_log_level(level: &str) -> Result<()> {
    if !LOG_LEVELS.contains(&level) {
        anyhow::bail!(
            "Invalid log_level: {}. Must be one of: {}",
            level,
            LOG_LEVELS.join(", ")
        );
    }
    Ok(())
}
