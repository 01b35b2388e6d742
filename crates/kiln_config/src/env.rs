//! Environment lookup used during configuration resolution.

use std::collections::{BTreeMap, HashMap};

/// A source of environment variables.
///
/// Resolution reads the environment through this trait so that callers
/// (and tests) can supply a fixed environment instead of the process one.
pub trait EnvSource {
    /// Returns the value of `key`, or `None` if it is unset.
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the first non-empty value among `keys`, in order.
    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.var(k))
            .find(|v| !v.is_empty())
    }
}

/// The environment of the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}
