//! Shared setup for commands: config discovery and context resolution.

use std::path::{Path, PathBuf};

use kiln_build::BuildContext;
use kiln_config::{discover_config, load_config, KilnConfig, ProcessEnv};

use crate::GlobalArgs;

/// Loads `--config` if given, otherwise `kiln.toml` in the current directory.
pub fn load(global: &GlobalArgs) -> Result<KilnConfig, Box<dyn std::error::Error>> {
    let mut config = match &global.config {
        Some(path) => load_config(Path::new(path))?,
        None => discover_config(&std::env::current_dir()?)?,
    };
    if let Some(dir) = &global.cache_dir {
        config.cache.root = Some(PathBuf::from(dir));
    }
    Ok(config)
}

/// Resolves `config` against the process environment.
pub fn context(config: &KilnConfig) -> Result<BuildContext, Box<dyn std::error::Error>> {
    Ok(BuildContext::from_config(config, &ProcessEnv)?)
}
