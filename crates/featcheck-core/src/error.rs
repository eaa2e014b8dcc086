//! Harness-level error taxonomy.
//!
//! Per-exemplar failures (compile failure, mismatch, timeout, crash) are not
//! errors: they become an [`Outcome`](crate::outcome::Outcome). The enums here
//! cover only the faults that abort a whole run.

use std::path::PathBuf;

/// Errors raised while discovering exemplars. Fatal before scheduling.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("exemplar root does not exist: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("exemplar root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("no eligible source files under {}", .0.display())]
    NoExemplars(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture declaration in {}: {reason}", path.display())]
    InvalidFixture { path: PathBuf, reason: String },
}

/// Faults in the harness itself (not in the exemplar under test).
#[derive(Debug, thiserror::Error)]
pub enum HarnessFault {
    #[error("toolchain `{program}` unavailable: {source}")]
    ToolchainUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot prepare scratch directory under {}: {source}", root.display())]
    Scratch {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Worker(String),
}

/// Invalid or unreadable harness configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Any error that aborts a harness run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("harness fault: {0}")]
    Fault(#[from] HarnessFault),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
