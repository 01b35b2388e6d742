//! Resolution of device and cache settings against the environment.
//!
//! Each setting is taken from the explicit configuration first, then from an
//! ordered list of environment variables, then from a per-platform default.

use std::path::PathBuf;

use crate::env::EnvSource;
use crate::error::ConfigError;
use crate::types::{BackendKind, CacheConfig, DeviceConfig};

/// Environment variables consulted for the compiler, in order.
pub const COMPILER_VARS: &[&str] = &["KILN_CXX", "CXX"];

/// Environment variables consulted for the compiler flags, in order.
pub const COMPILER_FLAGS_VARS: &[&str] = &["KILN_CXXFLAGS", "CXXFLAGS"];

/// Environment variables consulted for the compiler environment script.
pub const COMPILER_ENV_SCRIPT_VARS: &[&str] = &["KILN_COMPILER_ENV_SCRIPT"];

/// Environment variable overriding the cache root.
pub const CACHE_DIR_VAR: &str = "KILN_CACHE_DIR";

/// Character that joins cache-key components; no resolved setting may contain it.
pub const KEY_SEPARATOR: char = '|';

/// Compiler used when neither config nor environment names one.
pub fn default_compiler() -> &'static str {
    if cfg!(windows) {
        "cl.exe"
    } else {
        "g++"
    }
}

/// Compiler flags used when neither config nor environment provide them.
pub fn default_compiler_flags() -> &'static str {
    if cfg!(windows) {
        "/O2"
    } else {
        "-g"
    }
}

/// Fully resolved device settings, ready to open a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// Execution model.
    pub backend: BackendKind,
    /// Native compiler executable.
    pub compiler: String,
    /// Flags passed to the native compiler.
    pub compiler_flags: String,
    /// Script sourced before compiling; empty when unused.
    pub compiler_env_script: String,
    /// Vendor hints joined with `,`; empty when none were given.
    pub vendor_hint: String,
    /// Worker thread hint for the threaded backend.
    pub threads: Option<usize>,
}

/// Resolves device settings, falling back through the environment and platform defaults.
///
/// An explicitly configured empty compiler cannot be satisfied and is an error.
/// Settings that end up in the cache key must not contain [`KEY_SEPARATOR`].
pub fn resolve_device(
    config: &DeviceConfig,
    env: &dyn EnvSource,
) -> Result<ResolvedDevice, ConfigError> {
    let compiler = match &config.compiler {
        Some(c) if c.trim().is_empty() => {
            return Err(ConfigError::Unresolvable("compiler".to_string()));
        }
        Some(c) => c.clone(),
        None => env
            .first_of(COMPILER_VARS)
            .unwrap_or_else(|| default_compiler().to_string()),
    };

    let compiler_flags = match &config.compiler_flags {
        Some(f) => f.clone(),
        None => env
            .first_of(COMPILER_FLAGS_VARS)
            .unwrap_or_else(|| default_compiler_flags().to_string()),
    };

    let compiler_env_script = match &config.compiler_env_script {
        Some(s) => s.clone(),
        None => env.first_of(COMPILER_ENV_SCRIPT_VARS).unwrap_or_default(),
    };

    if config.threads == Some(0) {
        return Err(ConfigError::ValidationError(
            "device.threads must be at least 1".to_string(),
        ));
    }

    let vendor_hint = config.vendor_hints.join(",");
    for (name, value) in [
        ("compiler", &compiler),
        ("compiler_flags", &compiler_flags),
        ("compiler_env_script", &compiler_env_script),
        ("vendor_hints", &vendor_hint),
    ] {
        if value.contains(KEY_SEPARATOR) {
            return Err(ConfigError::ValidationError(format!(
                "device.{name} must not contain '{KEY_SEPARATOR}'"
            )));
        }
    }

    Ok(ResolvedDevice {
        backend: config.backend,
        compiler,
        compiler_flags,
        compiler_env_script,
        vendor_hint,
        threads: config.threads,
    })
}

/// Resolves the cache root: config, then `KILN_CACHE_DIR`, then `$HOME/.cache/kiln`.
pub fn resolve_cache_root(
    config: &CacheConfig,
    env: &dyn EnvSource,
) -> Result<PathBuf, ConfigError> {
    if let Some(root) = &config.root {
        return Ok(root.clone());
    }
    if let Some(dir) = env.first_of(&[CACHE_DIR_VAR]) {
        return Ok(PathBuf::from(dir));
    }
    env.first_of(&["HOME", "USERPROFILE"])
        .map(|home| PathBuf::from(home).join(".cache").join("kiln"))
        .ok_or_else(|| ConfigError::Unresolvable("cache root".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn explicit_values_win() {
        let config = DeviceConfig {
            compiler: Some("clang++".to_string()),
            compiler_flags: Some("-O3".to_string()),
            ..Default::default()
        };
        let e = env(&[("KILN_CXX", "icpc"), ("CXXFLAGS", "-O0")]);
        let r = resolve_device(&config, &e).unwrap();
        assert_eq!(r.compiler, "clang++");
        assert_eq!(r.compiler_flags, "-O3");
    }

    #[test]
    fn env_order_is_respected() {
        let e = env(&[("KILN_CXX", "icpc"), ("CXX", "g++-12")]);
        let r = resolve_device(&DeviceConfig::default(), &e).unwrap();
        assert_eq!(r.compiler, "icpc");

        let e = env(&[("KILN_CXX", ""), ("CXX", "g++-12"), ("CXXFLAGS", "-O1")]);
        let r = resolve_device(&DeviceConfig::default(), &e).unwrap();
        assert_eq!(r.compiler, "g++-12");
        assert_eq!(r.compiler_flags, "-O1");
    }

    #[test]
    fn platform_defaults_apply_last() {
        let r = resolve_device(&DeviceConfig::default(), &env(&[])).unwrap();
        assert_eq!(r.compiler, default_compiler());
        assert_eq!(r.compiler_flags, default_compiler_flags());
        assert_eq!(r.compiler_env_script, "");
        assert_eq!(r.backend, BackendKind::Serial);
    }

    #[test]
    fn explicit_empty_compiler_is_unresolvable() {
        let config = DeviceConfig {
            compiler: Some("  ".to_string()),
            ..Default::default()
        };
        let err = resolve_device(&config, &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Unresolvable(_)));
    }

    #[test]
    fn zero_threads_rejected() {
        let config = DeviceConfig {
            threads: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            resolve_device(&config, &env(&[])),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn vendor_hints_joined() {
        let config = DeviceConfig {
            vendor_hints: vec!["nvidia".to_string(), "sm_80".to_string()],
            ..Default::default()
        };
        let r = resolve_device(&config, &env(&[])).unwrap();
        assert_eq!(r.vendor_hint, "nvidia,sm_80");
    }

    #[test]
    fn key_separator_rejected_in_every_setting() {
        let cases = [
            DeviceConfig {
                compiler: Some("g++|clang".to_string()),
                ..Default::default()
            },
            DeviceConfig {
                compiler_flags: Some("-O2|-g".to_string()),
                ..Default::default()
            },
            DeviceConfig {
                compiler_env_script: Some("env.sh | tee".to_string()),
                ..Default::default()
            },
            DeviceConfig {
                vendor_hints: vec!["sm_80|".to_string()],
                ..Default::default()
            },
        ];
        for config in &cases {
            let err = resolve_device(config, &env(&[])).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{config:?}");
        }

        let e = env(&[("CXXFLAGS", "-O1|-g")]);
        assert!(resolve_device(&DeviceConfig::default(), &e).is_err());
    }

    #[test]
    fn cache_root_resolution() {
        let explicit = CacheConfig {
            root: Some(PathBuf::from("/opt/kiln")),
        };
        assert_eq!(
            resolve_cache_root(&explicit, &env(&[(CACHE_DIR_VAR, "/tmp/k")])).unwrap(),
            PathBuf::from("/opt/kiln")
        );
        assert_eq!(
            resolve_cache_root(&CacheConfig::default(), &env(&[(CACHE_DIR_VAR, "/tmp/k")]))
                .unwrap(),
            PathBuf::from("/tmp/k")
        );
        assert_eq!(
            resolve_cache_root(&CacheConfig::default(), &env(&[("HOME", "/home/u")])).unwrap(),
            PathBuf::from("/home/u").join(".cache").join("kiln")
        );
        assert!(resolve_cache_root(&CacheConfig::default(), &env(&[])).is_err());
    }
}
