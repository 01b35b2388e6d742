//! `kiln locks`: list lock directories present in the cache.
//!
//! A lock that stays listed while no build is running was most likely left
//! behind by a crashed builder and has to be removed by hand.

use kiln_cache::list_locks;

use crate::{settings, GlobalArgs};

/// Runs `kiln locks`.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = settings::load(global)?;
    let ctx = settings::context(&config)?;
    let locks = list_locks(&ctx.cache_root)?;

    for lock in &locks {
        println!("{}_{}  {}", lock.digest, lock.depth, lock.path.display());
    }
    if !global.quiet {
        eprintln!("{} lock(s) under {}", locks.len(), ctx.cache_root.display());
    }
    Ok(0)
}
