//! `kiln config`: print the resolved settings as JSON.

use serde_json::json;

use crate::{settings, GlobalArgs};

/// Runs `kiln config`.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = settings::load(global)?;
    let ctx = settings::context(&config)?;
    let device = &ctx.device;
    let out = json!({
        "cache_root": ctx.cache_root.display().to_string(),
        "device": {
            "backend": device.backend.tag(),
            "compiler": device.compiler,
            "compiler_flags": device.compiler_flags,
            "compiler_env_script": device.compiler_env_script,
            "vendor_hint": device.vendor_hint,
            "threads": device.threads,
        },
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(0)
}
