//! Native toolchain helpers shared by every host-compiled backend.
//!
//! These are free functions rather than backend methods: each backend
//! variant composes them with its own extra flags.

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::DeviceError;
use crate::identity::DeviceIdentity;

/// Compiler families that need different command-line conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// GCC (`gcc`, `g++`).
    Gnu,
    /// Clang/LLVM (`clang`, `clang++`).
    Llvm,
    /// Intel (`icc`, `icpc`, `icx`, `icpx`).
    Intel,
    /// Microsoft Visual C++ (`cl`, `cl.exe`).
    Msvc,
    /// Anything else; treated like GCC.
    Unknown,
}

/// Guesses the compiler family from the executable name.
pub fn compiler_vendor(compiler: &str) -> Vendor {
    let exe = Path::new(compiler)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(compiler)
        .to_ascii_lowercase();
    let exe = exe.strip_suffix(".exe").unwrap_or(&exe);

    if exe == "cl" {
        Vendor::Msvc
    } else if exe.starts_with("clang") {
        Vendor::Llvm
    } else if ["icc", "icpc", "icx", "icpx"].iter().any(|p| exe.starts_with(p)) {
        Vendor::Intel
    } else if exe.starts_with("gcc") || exe.starts_with("g++") || exe.ends_with("-gcc") || exe.ends_with("-g++") || exe == "cc" || exe == "c++" {
        Vendor::Gnu
    } else {
        Vendor::Unknown
    }
}

/// Flags that make the compiler emit a loadable shared library.
pub fn shared_library_flags(vendor: Vendor) -> &'static [&'static str] {
    match vendor {
        Vendor::Msvc => &["/nologo", "/LD"],
        _ => &["-shared", "-fPIC"],
    }
}

/// The flag enabling OpenMP for the compiler family.
pub fn openmp_flag(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Intel => "-qopenmp",
        Vendor::Msvc => "/openmp",
        _ => "-fopenmp",
    }
}

/// Renders a preprocessor define in the compiler family's syntax.
pub fn define_flag(vendor: Vendor, name: &str, value: &str) -> String {
    match vendor {
        Vendor::Msvc => format!("/D{name}={value}"),
        _ => format!("-D{name}={value}"),
    }
}

/// Appends `extra` to `flags`, separated by a space.
pub fn join_flags(flags: &str, extra: &[String]) -> String {
    let mut out = flags.trim().to_string();
    for flag in extra {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(flag);
    }
    out
}

/// Compiles `source` into the shared library `output`.
///
/// When the identity names an environment script, the compiler runs through
/// the platform shell after the script. Any non-zero exit is reported with
/// the toolchain's full output.
pub fn compile_shared_library(
    identity: &DeviceIdentity,
    source: &Path,
    output: &Path,
) -> Result<(), DeviceError> {
    let vendor = compiler_vendor(&identity.compiler);
    let mut args: Vec<String> = identity
        .compiler_flags
        .split_whitespace()
        .map(str::to_string)
        .collect();
    args.extend(shared_library_flags(vendor).iter().map(|f| f.to_string()));
    args.push(source.display().to_string());
    match vendor {
        Vendor::Msvc => args.push(format!("/Fe:{}", output.display())),
        _ => {
            args.push("-o".to_string());
            args.push(output.display().to_string());
        }
    }

    let command_line = format!("{} {}", identity.compiler, args.join(" "));
    let mut command = if identity.compiler_env_script.trim().is_empty() {
        let mut c = Command::new(&identity.compiler);
        c.args(&args);
        c
    } else {
        let script = format!("{} && {command_line}", identity.compiler_env_script);
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        }
    };

    debug!("running compile command: {command_line}");
    let result = command.output().map_err(|e| DeviceError::Spawn {
        command: command_line.clone(),
        source: e,
    })?;

    if !result.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&result.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&result.stdout);
        if !stdout.trim().is_empty() {
            diagnostics.push_str(&stdout);
        }
        return Err(DeviceError::Compile {
            source_path: source.to_path_buf(),
            command: command_line,
            diagnostics,
        });
    }
    Ok(())
}

/// Returns `true` if `compiler --version` runs successfully.
pub fn compiler_available(compiler: &str) -> bool {
    Command::new(compiler)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
