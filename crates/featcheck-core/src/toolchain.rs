//! Toolchain definitions and configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the exemplar source path.
pub const SRC_PLACEHOLDER: &str = "{src}";
/// Placeholder replaced by the output binary path.
pub const OUT_PLACEHOLDER: &str = "{out}";
/// Placeholder replaced by the corpus root (where the shared `io.c` lives).
pub const ROOT_PLACEHOLDER: &str = "{root}";

/// Builtin C toolchains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinToolchain {
    /// The system `cc`.
    Cc,

    /// GNU `gcc`.
    Gcc,

    /// LLVM `clang`.
    Clang,
}

impl BuiltinToolchain {
    /// Parse a toolchain name (`cc`, `gcc`, `clang`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "cc" => Some(BuiltinToolchain::Cc),
            "gcc" => Some(BuiltinToolchain::Gcc),
            "clang" => Some(BuiltinToolchain::Clang),
            _ => None,
        }
    }

    /// The compiler program.
    pub fn program(&self) -> &'static str {
        match self {
            BuiltinToolchain::Cc => "cc",
            BuiltinToolchain::Gcc => "gcc",
            BuiltinToolchain::Clang => "clang",
        }
    }

    /// Default argument template for this toolchain.
    pub fn args(&self) -> Vec<String> {
        ["-std=c99", "-w", "-I", ROOT_PLACEHOLDER, "-o", OUT_PLACEHOLDER, SRC_PLACEHOLDER]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// How to turn one source file into an executable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler executable.
    pub program: String,

    /// Argument template; `{src}`, `{out}` and `{root}` are substituted.
    pub args: Vec<String>,

    /// Build timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self::from_builtin(BuiltinToolchain::Cc, 60)
    }
}

impl ToolchainConfig {
    /// Create a toolchain configuration from a builtin toolchain.
    pub fn from_builtin(toolchain: BuiltinToolchain, timeout_secs: u64) -> Self {
        Self {
            program: toolchain.program().to_string(),
            args: toolchain.args(),
            timeout_secs,
        }
    }

    /// Create a custom toolchain configuration.
    pub fn custom(program: String, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            program,
            args,
            timeout_secs,
        }
    }

    /// Render the argument list for one build.
    pub fn render_args(&self, src: &Path, out: &Path, root: &Path) -> Vec<String> {
        let src = src.to_string_lossy();
        let out = out.to_string_lossy();
        let root = root.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(SRC_PLACEHOLDER, &src)
                    .replace(OUT_PLACEHOLDER, &out)
                    .replace(ROOT_PLACEHOLDER, &root)
            })
            .collect()
    }

    /// Full command line for one build (program first), for logs.
    pub fn command_line(&self, src: &Path, out: &Path, root: &Path) -> Vec<String> {
        let mut command = vec![self.program.clone()];
        command.extend(self.render_args(src, out, root));
        command
    }
}
