//! Classified result of running one exemplar through the pipeline.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::Exemplar;

/// Outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Pass,
    CompileFailure,
    RuntimeMismatch,
    Timeout,
    Crash,
}

impl OutcomeKind {
    /// Every kind, in report column order.
    pub const ALL: [OutcomeKind; 5] = [
        OutcomeKind::Pass,
        OutcomeKind::CompileFailure,
        OutcomeKind::RuntimeMismatch,
        OutcomeKind::Timeout,
        OutcomeKind::Crash,
    ];

    /// Stable snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeKind::Pass => "pass",
            OutcomeKind::CompileFailure => "compile_failure",
            OutcomeKind::RuntimeMismatch => "runtime_mismatch",
            OutcomeKind::Timeout => "timeout",
            OutcomeKind::Crash => "crash",
        }
    }

    /// Whether this kind counts as a pass.
    pub fn is_pass(&self) -> bool {
        matches!(self, OutcomeKind::Pass)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// The classified result for one exemplar. Never mutated once aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Exemplar path relative to the root.
    pub exemplar: String,

    /// Category the exemplar belongs to.
    pub category: String,

    /// Classification.
    pub kind: OutcomeKind,

    /// One-line cause.
    pub explanation: String,

    /// Verbatim diagnostics or captured stderr, never summarised.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Time spent on this exemplar (build + run) in milliseconds.
    pub duration_ms: u64,
}

impl Outcome {
    /// Create an outcome for `exemplar`.
    pub fn new(exemplar: &Exemplar, kind: OutcomeKind, explanation: impl Into<String>) -> Self {
        Self {
            exemplar: exemplar.id.clone(),
            category: exemplar.category.clone(),
            kind,
            explanation: explanation.into(),
            detail: None,
            duration_ms: 0,
        }
    }

    /// Attach verbatim detail; empty detail is dropped.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        self.detail = if detail.is_empty() { None } else { Some(detail) };
        self
    }

    /// Record the time spent.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// Whether this outcome is a pass.
    pub fn passed(&self) -> bool {
        self.kind.is_pass()
    }
}
