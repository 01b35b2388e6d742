//! `kiln build`: build one kernel through the cache.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kiln_build::BuildPipeline;
use kiln_common::compress_path;
use kiln_device::DeviceBackend;
use kiln_translate::{BuildFlags, MarkerTranslator};

use crate::{settings, BuildArgs, GlobalArgs};

/// Runs `kiln build`. Command-line options override the configuration file.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut config = settings::load(global)?;
    if let Some(backend) = args.backend {
        config.device.backend = backend.into();
    }
    if let Some(compiler) = &args.compiler {
        config.device.compiler = Some(compiler.clone());
    }
    if let Some(flags) = &args.flags {
        config.device.compiler_flags = Some(flags.clone());
    }

    let mut ctx = settings::context(&config)?;
    if let Some(secs) = args.timeout {
        ctx = ctx.with_lock_timeout(Duration::from_secs(secs));
    }

    let flags = parse_defines(&args.defines);
    let pipeline = BuildPipeline::new(&ctx, Arc::new(MarkerTranslator::new()));
    let mut device = ctx.open_device();
    let source = Path::new(&args.source);

    let digest = pipeline.digest_for(source, &flags, &device)?;
    let kernel = pipeline.build_kernel(source, &args.function, &flags, &mut device)?;

    if !global.quiet {
        println!("{}", device.identity().describe());
        println!("digest  {digest}");
        println!(
            "binary  {}",
            compress_path(kernel.binary_path(), &ctx.cache_root)
        );
        println!("entry   {} ({} args)", kernel.entry_symbol(), kernel.args().len());
    }

    device.free_kernel(kernel)?;
    device.free();
    Ok(0)
}

/// Turns `NAME=VALUE` / `NAME` strings into build flags.
fn parse_defines(defines: &[String]) -> BuildFlags {
    defines.iter().fold(BuildFlags::new(), |flags, d| match d.split_once('=') {
        Some((name, value)) => flags.define(name.trim(), value.trim()),
        None => flags.define(d.trim(), ""),
    })
}
