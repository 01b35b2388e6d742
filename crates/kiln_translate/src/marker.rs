//! Built-in translator for C-family kernels marked with `@kernel`.
//!
//! ```c
//! @kernel void addVectors(int n, const float *a, const float *b, float *ab) {
//!   for (int i = 0; i < n; ++i) ab[i] = a[i] + b[i];
//! }
//! ```
//!
//! Each marker becomes `KILN_KERNEL` (C linkage, exported), and for every
//! kernel a `__kiln_launch_<name>(void **args)` wrapper is appended that
//! unpacks one slot per argument: pointer arguments are passed through,
//! scalars are read through their slot.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use kiln_config::BackendKind;
use kiln_common::Language;

use crate::{
    ArgInfo, ArgKind, FunctionInfo, KernelSourceTranslator, Translation, TranslateError,
    TranslationRequest,
};

/// Marker that introduces a kernel definition.
pub const KERNEL_MARKER: &str = "@kernel";

/// Prefix of the generated launch wrappers.
pub const LAUNCH_PREFIX: &str = "__kiln_launch_";

/// Output format version of this translator.
pub const MARKER_TRANSLATOR_VERSION: &str = "v3";

/// Translator for `@kernel`-marked C-family sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerTranslator;

impl MarkerTranslator {
    /// Creates the translator.
    pub fn new() -> Self {
        Self
    }
}

impl KernelSourceTranslator for MarkerTranslator {
    fn version(&self) -> &str {
        MARKER_TRANSLATOR_VERSION
    }

    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translation, TranslateError> {
        if request.language != Language::C {
            return Err(TranslateError::UnsupportedLanguage {
                source_path: request.source_path.to_path_buf(),
                language: request.language.as_str().to_string(),
            });
        }

        let kernels = find_kernels(request)?;
        let dialect = dialect_for(request.mode);

        let mut functions = BTreeMap::new();
        for kernel in &kernels {
            functions.insert(
                kernel.name.clone(),
                FunctionInfo {
                    entry: format!("{LAUNCH_PREFIX}{}", kernel.name),
                    dialect: dialect.to_string(),
                    args: kernel.args.clone(),
                },
            );
        }

        if !functions.contains_key(request.function) {
            return Err(TranslateError::MissingFunction {
                source_path: request.source_path.to_path_buf(),
                function: request.function.to_string(),
            });
        }

        let mut out = String::new();
        out.push_str(&prelude(request.mode));
        out.push_str(&request.flags.prelude());
        out.push_str(&request.source.replace(KERNEL_MARKER, "KILN_KERNEL"));
        if !out.ends_with('\n') {
            out.push('\n');
        }
        for kernel in &kernels {
            out.push_str(&launch_wrapper(kernel));
        }

        Ok(Translation {
            source: out,
            functions,
        })
    }
}

fn dialect_for(mode: BackendKind) -> &'static str {
    match mode {
        BackendKind::Serial => "c-serial",
        BackendKind::Threaded => "c-threaded",
        BackendKind::Accelerator => "c-accelerator",
    }
}

fn prelude(mode: BackendKind) -> String {
    let mode_define = match mode {
        BackendKind::Serial => "KILN_MODE_SERIAL",
        BackendKind::Threaded => "KILN_MODE_THREADED",
        BackendKind::Accelerator => "KILN_MODE_ACCELERATOR",
    };
    format!(
        "/* kiln {MARKER_TRANSLATOR_VERSION} */\n\
         #define {mode_define} 1\n\
         #ifdef __cplusplus\n\
         #  define KILN_EXTERN_C extern \"C\"\n\
         #else\n\
         #  define KILN_EXTERN_C\n\
         #endif\n\
         #ifdef _WIN32\n\
         #  define KILN_EXPORT __declspec(dllexport)\n\
         #else\n\
         #  define KILN_EXPORT\n\
         #endif\n\
         #define KILN_KERNEL KILN_EXTERN_C KILN_EXPORT\n"
    )
}

fn launch_wrapper(kernel: &Kernel) -> String {
    let mut call_args = Vec::with_capacity(kernel.args.len());
    for (i, arg) in kernel.args.iter().enumerate() {
        match arg.kind {
            ArgKind::Pointer => call_args.push(format!("({}) args[{i}]", arg.ty)),
            ArgKind::Scalar => call_args.push(format!("*({} *) args[{i}]", arg.ty)),
        }
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "KILN_KERNEL void {LAUNCH_PREFIX}{}(void **args) {{",
        kernel.name
    );
    if kernel.args.is_empty() {
        out.push_str("  (void) args;\n");
    }
    let _ = writeln!(out, "  {}({});", kernel.name, call_args.join(", "));
    out.push_str("}\n");
    out
}

struct Kernel {
    name: String,
    args: Vec<ArgInfo>,
}

fn find_kernels(request: &TranslationRequest<'_>) -> Result<Vec<Kernel>, TranslateError> {
    let src = request.source;
    let malformed = |pos: usize, reason: &str| TranslateError::Malformed {
        source_path: request.source_path.to_path_buf(),
        line: src[..pos].matches('\n').count() + 1,
        reason: reason.to_string(),
    };

    let mut kernels = Vec::new();
    let mut search_from = 0;
    while let Some(offset) = src[search_from..].find(KERNEL_MARKER) {
        let marker = search_from + offset;
        let after = marker + KERNEL_MARKER.len();

        let open = src[after..]
            .find('(')
            .map(|o| after + o)
            .ok_or_else(|| malformed(marker, "kernel without a parameter list"))?;
        let signature: Vec<&str> = src[after..open].split_whitespace().collect();
        match signature.as_slice() {
            ["void", name] if is_identifier(name) => {
                let close = matching_paren(src, open)
                    .ok_or_else(|| malformed(open, "unterminated parameter list"))?;
                let args = parse_params(&src[open + 1..close])
                    .map_err(|reason| malformed(open, &reason))?;
                kernels.push(Kernel {
                    name: (*name).to_string(),
                    args,
                });
                search_from = close;
            }
            [ret, _] if *ret != "void" => {
                return Err(malformed(marker, "kernels must return void"));
            }
            _ => return Err(malformed(marker, "expected `void <name>(...)` after @kernel")),
        }
    }
    Ok(kernels)
}

fn matching_paren(src: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in src[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_params(list: &str) -> Result<Vec<ArgInfo>, String> {
    let list = list.trim();
    if list.is_empty() || list == "void" {
        return Ok(Vec::new());
    }
    list.split(',').map(parse_param).collect()
}

fn parse_param(param: &str) -> Result<ArgInfo, String> {
    let mut decl = param.trim().to_string();
    let mut is_array = false;
    if let Some(bracket) = decl.find('[') {
        decl.truncate(bracket);
        is_array = true;
    }
    let decl = decl.trim_end();

    let name_start = decl
        .rfind(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .map_or(0, |i| i + 1);
    let name = &decl[name_start..];
    let ty = decl[..name_start].trim();
    if !is_identifier(name) || ty.is_empty() {
        return Err(format!("cannot parse kernel parameter `{}`", param.trim()));
    }

    let (ty, kind) = if is_array {
        (format!("{ty} *"), ArgKind::Pointer)
    } else if ty.contains('*') {
        (ty.to_string(), ArgKind::Pointer)
    } else {
        (ty.to_string(), ArgKind::Scalar)
    };
    Ok(ArgInfo {
        name: name.to_string(),
        ty,
        kind,
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
