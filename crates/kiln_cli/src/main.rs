//! kiln CLI: builds kernels through the shared cache and inspects it.
//!
//! Provides `kiln build` to translate, compile, and load one kernel,
//! `kiln hash` to print content digests, `kiln locks` to list lock
//! directories, and `kiln config` to print the resolved settings.

#![warn(missing_docs)]

mod build;
mod hash;
mod locks;
mod settings;
mod show;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use kiln_config::BackendKind;

/// kiln: content-addressed kernel builds.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kernel build cache")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Override the cache root.
    #[arg(long, global = true)]
    pub cache_dir: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build one kernel and report its cache entry.
    Build(BuildArgs),
    /// Print the digest of a file.
    Hash(HashArgs),
    /// List lock directories in the cache.
    Locks,
    /// Print the resolved configuration.
    Config,
}

/// Arguments for `kiln build`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Kernel source file.
    pub source: String,

    /// Kernel function to load.
    pub function: String,

    /// Execution model to build for.
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Native compiler.
    #[arg(long)]
    pub compiler: Option<String>,

    /// Native compiler flags.
    #[arg(long, allow_hyphen_values = true)]
    pub flags: Option<String>,

    /// Preprocessor define for the kernel, as `NAME=VALUE` or `NAME`.
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Give up waiting for another builder after this many seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for `kiln hash`.
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// File to hash.
    pub file: String,

    /// Salt appended to the file contents.
    #[arg(long, default_value = "")]
    pub salt: String,
}

/// Execution model selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// Synchronous host execution.
    Serial,
    /// OpenMP host execution.
    Threaded,
    /// Accelerator-style execution.
    Accelerator,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Serial => BackendKind::Serial,
            BackendArg::Threaded => BackendKind::Threaded,
            BackendArg::Accelerator => BackendKind::Accelerator,
        }
    }
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Optional path to a config file.
    pub config: Option<String>,
    /// Optional cache root override.
    pub cache_dir: Option<String>,
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("KILN_LOG")
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        config: cli.config,
        cache_dir: cli.cache_dir,
    };

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Hash(ref args) => hash::run(args),
        Command::Locks => locks::run(&global),
        Command::Config => show::run(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
