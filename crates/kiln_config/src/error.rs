//! Error types for configuration loading and resolution.

/// Errors that can occur when loading `kiln.toml` or resolving device settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A backend name did not match any known execution model.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// A setting could not be resolved from config, environment, or defaults.
    #[error("unable to resolve {0}")]
    Unresolvable(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
