//! featcheck - feature-conformance harness for a corpus of C exemplars
//!
//! Provides a harness that:
//! - Discovers exemplars and their fixtures by category
//! - Builds each one with an external toolchain in a scoped directory
//! - Runs the artifact in an isolated, time-bounded sandbox
//! - Classifies the result and aggregates a per-category report

pub mod build;
pub mod compare;
pub mod config;
pub mod error;
pub mod fixture;
pub mod outcome;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod run_spec;
pub mod sandbox;
pub mod telemetry;
pub mod toolchain;

// Re-export key types
pub use build::{BuildAdapter, BuildArtifact, ToolchainBuilder};
pub use compare::{classify, stdout_matches};
pub use config::HarnessConfig;
pub use error::{ConfigError, DiscoveryError, HarnessError, HarnessFault, HarnessResult};
pub use fixture::{EmbeddedComment, FixtureDecl, FixtureSource, SiblingFiles, ADDR_WILDCARD};
pub use outcome::{Outcome, OutcomeKind};
pub use pipeline::{run_exemplar, Harness};
pub use registry::{Exemplar, Registry};
pub use report::{KindCounts, Report, ReportFormat, Verdict};
pub use run_spec::RunSpec;
pub use sandbox::{ExecutionResult, ExecutionSandbox, SandboxConfig};
pub use telemetry::init_tracing;
pub use toolchain::{BuiltinToolchain, ToolchainConfig};
