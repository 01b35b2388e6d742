//! Loading of `kiln.toml` and resolution of device and cache settings.
//!
//! Settings are resolved once, explicitly, from the configuration file, the
//! environment, and per-platform defaults, and then passed by value into the
//! build pipeline and device backends.

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use env::{EnvSource, ProcessEnv};
pub use error::ConfigError;
pub use loader::{discover_config, load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{
    default_compiler, default_compiler_flags, resolve_cache_root, resolve_device, ResolvedDevice,
    CACHE_DIR_VAR, COMPILER_ENV_SCRIPT_VARS, COMPILER_FLAGS_VARS, COMPILER_VARS, KEY_SEPARATOR,
};
pub use types::*;
