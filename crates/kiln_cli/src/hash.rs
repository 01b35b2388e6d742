//! `kiln hash`: print the digest of a file.

use std::path::Path;

use kiln_cache::read_file;
use kiln_common::hash_salted;

use crate::HashArgs;

/// Runs `kiln hash`.
pub fn run(args: &HashArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let bytes = read_file(Path::new(&args.file))?;
    println!("{}  {}", hash_salted(&bytes, args.salt.as_bytes()), args.file);
    Ok(0)
}
