//! Configuration loading and types

use std::path::{Path, PathBuf};

use cimq_query::EngineConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the cimq CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace used when a command does not name one
    #[serde(default = "default_namespace")]
    pub default_namespace: String,
    /// Fixture file served by the in-memory backend instead of the native subsystem
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    /// Engine tunables
    #[serde(default)]
    pub engine: EngineConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            fixture: None,
            engine: EngineConfig::default(),
            log: LogConfig::default(),
        }
    }
}

fn default_namespace() -> String {
    r"root\cimv2".to_string()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration text
    ///
    /// # Errors
    /// Returns error if the TOML is invalid or the engine settings are unusable
    pub fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("CIMQ_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let paths = [
            Some(PathBuf::from("cimq.toml")),
            dirs::config_dir().map(|p| p.join("cimq").join("cimq.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }
}
