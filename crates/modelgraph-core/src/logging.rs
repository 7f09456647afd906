use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config_manager::{ConfigError, LoggingConfig};
use crate::Result;

/// Installs a global `tracing` subscriber for `config`.
///
/// `RUST_LOG` wins over `config.level` when set. Returns `Ok(false)` when a
/// global subscriber was already installed, which is common in tests.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
            .is_ok(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .is_ok(),
        other => {
            return Err(ConfigError::ValidationError(format!("Invalid log format: {}", other)).into())
        }
    };

    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_format() {
        let config = LoggingConfig {
            level: "info".to_string(),
            format: "xml".to_string(),
        };
        assert!(init_tracing(&config).is_err());
    }

    #[test]
    fn second_install_is_not_an_error() {
        let config = LoggingConfig::default();
        let _ = init_tracing(&config).unwrap();
        assert!(!init_tracing(&config).unwrap());
    }
}
