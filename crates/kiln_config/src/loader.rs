//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates a configuration file.
pub fn load_config(path: &Path) -> Result<KilnConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Loads `<dir>/kiln.toml` if it exists, otherwise returns the default configuration.
pub fn discover_config(dir: &Path) -> Result<KilnConfig, ConfigError> {
    let path = dir.join(CONFIG_FILE);
    if path.is_file() {
        load_config(&path)
    } else {
        Ok(KilnConfig::default())
    }
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if let Some(root) = &config.cache.root {
        if root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.root must not be empty".to_string(),
            ));
        }
    }
    if config.device.threads == Some(0) {
        return Err(ConfigError::ValidationError(
            "device.threads must be at least 1".to_string(),
        ));
    }
    Ok(())
}
