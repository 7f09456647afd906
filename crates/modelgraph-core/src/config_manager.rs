use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Runtime configuration for models and their journals.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelGraphConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Undo/redo history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalConfig {
    /// Maximum number of root scopes kept per model. 0 keeps everything.
    #[serde(default = "default_journal_max_entries")]
    pub max_entries: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_entries: default_journal_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationConfig {
    /// Capacity of the per-model broadcast channel used by async subscribers.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_journal_max_entries() -> usize {
    0
}

fn default_broadcast_capacity() -> usize {
    256
}

/// Loads `ModelGraphConfig` from files and environment.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: ModelGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file included)
    /// 2. Config file (./.modelgraph.toml, then ~/.modelgraph/config.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading ModelGraph configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: NONE (using defaults)"),
        }
        info!(
            "Journal cap: {}, broadcast capacity: {}",
            config.journal.max_entries, config.notifications.broadcast_capacity
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load a specific file, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Parse configuration from TOML text. No environment overrides are applied.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ModelGraphConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            } else {
                info!("Loaded .env file from current directory");
            }
        }
    }

    fn load_config_file() -> Result<(ModelGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".modelgraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".modelgraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        info!("No config file found, using defaults");
        Ok((ModelGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<ModelGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: ModelGraphConfig) -> ModelGraphConfig {
        if let Ok(level) = std::env::var("MODELGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("MODELGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Ok(max) = std::env::var("MODELGRAPH_JOURNAL_MAX_ENTRIES") {
            match max.parse() {
                Ok(n) => config.journal.max_entries = n,
                Err(_) => warn!("Ignoring MODELGRAPH_JOURNAL_MAX_ENTRIES={}", max),
            }
        }
        if let Ok(capacity) = std::env::var("MODELGRAPH_BROADCAST_CAPACITY") {
            match capacity.parse() {
                Ok(n) => config.notifications.broadcast_capacity = n,
                Err(_) => warn!("Ignoring MODELGRAPH_BROADCAST_CAPACITY={}", capacity),
            }
        }

        config
    }

    fn validate_config(config: &ModelGraphConfig) -> Result<(), ConfigError> {
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        if config.notifications.broadcast_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "broadcast_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn config(&self) -> &ModelGraphConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = ModelGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelGraphConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.journal.max_entries, 0);
        assert_eq!(config.notifications.broadcast_capacity, 256);
    }

    #[test]
    fn test_config_validation() {
        let config = ModelGraphConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_config = config.clone();
        bad_config.logging.format = "xml".to_string();
        assert!(ConfigManager::validate_config(&bad_config).is_err());

        let mut bad_config = config;
        bad_config.notifications.broadcast_capacity = 0;
        assert!(ConfigManager::validate_config(&bad_config).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let manager = ConfigManager::from_toml_str("[journal]\nmax_entries = 10\n").unwrap();
        assert_eq!(manager.config().journal.max_entries, 10);
        assert_eq!(manager.config().logging.format, "pretty");
        assert!(manager.config_path().is_none());
    }
}
