//! Report aggregation and pass/fail verdict.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, OutcomeKind};
use crate::run_spec::RunSpec;

/// Per-kind outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub pass: usize,
    pub compile_failure: usize,
    pub runtime_mismatch: usize,
    pub timeout: usize,
    pub crash: usize,
}

impl KindCounts {
    /// Count one outcome of `kind`.
    pub fn add(&mut self, kind: OutcomeKind) {
        *self.slot(kind) += 1;
    }

    /// Count for `kind`.
    pub fn get(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Pass => self.pass,
            OutcomeKind::CompileFailure => self.compile_failure,
            OutcomeKind::RuntimeMismatch => self.runtime_mismatch,
            OutcomeKind::Timeout => self.timeout,
            OutcomeKind::Crash => self.crash,
        }
    }

    /// Total number of outcomes counted.
    pub fn total(&self) -> usize {
        OutcomeKind::ALL.iter().map(|k| self.get(*k)).sum()
    }

    /// Number of non-pass outcomes.
    pub fn failed(&self) -> usize {
        self.total() - self.pass
    }

    fn slot(&mut self, kind: OutcomeKind) -> &mut usize {
        match kind {
            OutcomeKind::Pass => &mut self.pass,
            OutcomeKind::CompileFailure => &mut self.compile_failure,
            OutcomeKind::RuntimeMismatch => &mut self.runtime_mismatch,
            OutcomeKind::Timeout => &mut self.timeout,
            OutcomeKind::Crash => &mut self.crash,
        }
    }
}

/// Pass/fail verdict derived from a [`Report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether every exemplar passed.
    pub passed: bool,

    /// One line per non-pass outcome (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Output format for a rendered report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{}' (expected text or json)", other)),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Text => f.write_str("text"),
            ReportFormat::Json => f.write_str("json"),
        }
    }
}

/// Aggregated result of a harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Run identity.
    pub run: RunSpec,

    /// Whether every exemplar passed.
    pub success: bool,

    /// Counts across all categories.
    pub totals: KindCounts,

    /// Counts per category, in category order.
    pub categories: BTreeMap<String, KindCounts>,

    /// One outcome per exemplar, sorted by category then path.
    pub outcomes: Vec<Outcome>,

    /// Wall-clock duration of the whole run in milliseconds.
    pub duration_ms: u64,
}

impl Report {
    /// Aggregate `outcomes` (in any order) into a report.
    pub fn new(run: RunSpec, mut outcomes: Vec<Outcome>, duration_ms: u64) -> Self {
        outcomes.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.exemplar.cmp(&b.exemplar))
        });

        let mut totals = KindCounts::default();
        let mut categories: BTreeMap<String, KindCounts> = BTreeMap::new();
        for outcome in &outcomes {
            totals.add(outcome.kind);
            categories
                .entry(outcome.category.clone())
                .or_default()
                .add(outcome.kind);
        }

        Self {
            run,
            success: totals.failed() == 0,
            totals,
            categories,
            outcomes,
            duration_ms,
        }
    }

    /// Outcomes that did not pass.
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    /// Process exit status: 0 only if every outcome passed.
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Evaluate the report into a verdict.
    pub fn verdict(&self) -> Verdict {
        let violations: Vec<String> = self
            .failures()
            .map(|o| format!("{} [{}] {}: {}", o.exemplar, o.category, o.kind, o.explanation))
            .collect();

        let passed = violations.is_empty();
        let message = if passed {
            format!("All {} exemplar(s) passed", self.totals.total())
        } else {
            format!("Run failed with {} violation(s)", violations.len())
        };

        Verdict {
            passed,
            violations,
            message,
        }
    }

    /// One-line summary distinguishing failure kinds.
    pub fn summary_line(&self) -> String {
        let t = &self.totals;
        format!(
            "{} exemplar(s): {} passed, {} compile failure(s), {} runtime mismatch(es), {} timeout(s), {} crash(es)",
            t.total(),
            t.pass,
            t.compile_failure,
            t.runtime_mismatch,
            t.timeout,
            t.crash
        )
    }

    /// Render in the requested format.
    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Text => Ok(self.render_text()),
            ReportFormat::Json => self.render_json(),
        }
    }

    /// Render as pretty-printed JSON.
    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as human-readable text.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "featcheck run {} (corpus {}, toolchain: {})\n",
            self.run.run_id,
            self.run.short_digest(),
            self.run.toolchain
        );

        let mut current: Option<&str> = None;
        for outcome in &self.outcomes {
            if current != Some(outcome.category.as_str()) {
                current = Some(outcome.category.as_str());
                let counts = self.categories.get(&outcome.category).copied().unwrap_or_default();
                out.push_str(&format!(
                    "\n[{}] {}/{} passed\n",
                    outcome.category,
                    counts.pass,
                    counts.total()
                ));
            }

            let icon = if outcome.passed() { "✓" } else { "✗" };
            out.push_str(&format!(
                "  {} {:<32} {:<16} ({}ms)\n",
                icon, outcome.exemplar, outcome.kind, outcome.duration_ms
            ));
            if !outcome.passed() {
                out.push_str(&format!("      {}\n", outcome.explanation));
                if let Some(detail) = &outcome.detail {
                    for line in detail.lines() {
                        out.push_str(&format!("      | {}\n", line));
                    }
                }
            }
        }

        out.push('\n');
        out.push_str(&format!(
            "{:<12} {:>5} {:>8} {:>9} {:>8} {:>6}\n",
            "category", "pass", "compile", "mismatch", "timeout", "crash"
        ));
        for (category, counts) in &self.categories {
            out.push_str(&format_counts_row(category, counts));
        }
        out.push_str(&format_counts_row("total", &self.totals));

        out.push('\n');
        out.push_str(&self.summary_line());
        out.push_str(&format!(" in {}ms\n", self.duration_ms));
        out.push_str(if self.success { "PASSED\n" } else { "FAILED\n" });
        out
    }
}

fn format_counts_row(label: &str, counts: &KindCounts) -> String {
    format!(
        "{:<12} {:>5} {:>8} {:>9} {:>8} {:>6}\n",
        label,
        counts.pass,
        counts.compile_failure,
        counts.runtime_mismatch,
        counts.timeout,
        counts.crash
    )
}
