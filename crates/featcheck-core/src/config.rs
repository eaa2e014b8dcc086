//! Harness configuration.
//!
//! A [`HarnessConfig`] can be loaded from a JSON file; every field is
//! optional there and falls back to [`Default`]. The CLI overlays its flags
//! on top before calling [`HarnessConfig::validate`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::ReportFormat;
use crate::sandbox::SandboxConfig;
use crate::toolchain::ToolchainConfig;

/// Default corpus root, relative to the working directory.
pub const DEFAULT_ROOT: &str = "corpus";

/// Complete configuration of one harness run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Corpus root directory.
    pub root: PathBuf,

    /// Categories to run (empty = all).
    pub categories: Vec<String>,

    /// Maximum number of exemplars in flight.
    pub jobs: usize,

    /// Global deadline for the whole run, in seconds.
    pub run_timeout_secs: Option<u64>,

    /// Compiler invocation.
    pub toolchain: ToolchainConfig,

    /// Artifact execution limits.
    pub sandbox: SandboxConfig,

    /// Report format.
    pub format: ReportFormat,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            categories: Vec::new(),
            jobs: default_jobs(),
            run_timeout_secs: None,
            toolchain: ToolchainConfig::default(),
            sandbox: SandboxConfig::default(),
            format: ReportFormat::default(),
        }
    }
}

impl HarnessConfig {
    /// Load a configuration file (JSON).
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        if self.toolchain.program.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "toolchain program must not be empty".to_string(),
            ));
        }
        if self.toolchain.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "build timeout must be greater than zero".to_string(),
            ));
        }
        if self.sandbox.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "execution timeout must be greater than zero".to_string(),
            ));
        }
        if self.sandbox.max_output_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "run timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Available parallelism, or 1 if it cannot be determined.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
