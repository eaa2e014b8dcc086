//! Outcome comparator: expected vs actual, classified.
//!
//! Stdout is compared byte-exactly except where the expected text carries the
//! [`ADDR_WILDCARD`] token, which matches one printed address (`0x` + hex
//! digits, or `(nil)`).

use regex::bytes::Regex;

use crate::build::BuildArtifact;
use crate::fixture::ADDR_WILDCARD;
use crate::outcome::{Outcome, OutcomeKind};
use crate::registry::Exemplar;
use crate::sandbox::ExecutionResult;

/// Pattern substituted for each [`ADDR_WILDCARD`].
const ADDR_PATTERN: &str = r"(?:0x[0-9a-fA-F]+|\(nil\))";

/// Classify one exemplar run.
///
/// `execution` is `None` only when the build failed.
pub fn classify(
    exemplar: &Exemplar,
    artifact: &BuildArtifact,
    execution: Option<&ExecutionResult>,
) -> Outcome {
    if !artifact.success {
        let explanation = if artifact.timed_out {
            "build timed out".to_string()
        } else {
            first_line(&artifact.diagnostics)
                .map(|l| format!("compile failed: {}", l))
                .unwrap_or_else(|| "compile failed".to_string())
        };
        return Outcome::new(exemplar, OutcomeKind::CompileFailure, explanation)
            .with_detail(artifact.diagnostics.clone());
    }

    let Some(execution) = execution else {
        return Outcome::new(
            exemplar,
            OutcomeKind::RuntimeMismatch,
            "artifact built but was never executed",
        );
    };

    if let Some(error) = &execution.launch_error {
        return Outcome::new(
            exemplar,
            OutcomeKind::CompileFailure,
            format!("artifact could not be executed: {}", error),
        );
    }

    let stderr = String::from_utf8_lossy(&execution.stderr).into_owned();

    if execution.timed_out {
        return Outcome::new(
            exemplar,
            OutcomeKind::Timeout,
            format!("timed out after {}ms", execution.duration_ms),
        )
        .with_detail(stderr);
    }

    let Some(exit_code) = execution.exit_code else {
        let cause = execution
            .signal
            .map(signal_name)
            .unwrap_or_else(|| "abnormal termination".to_string());
        return Outcome::new(exemplar, OutcomeKind::Crash, format!("terminated by {}", cause))
            .with_detail(stderr);
    };

    if exit_code != exemplar.expected_exit {
        return Outcome::new(
            exemplar,
            OutcomeKind::RuntimeMismatch,
            format!(
                "exit code {} (expected {})",
                exit_code, exemplar.expected_exit
            ),
        )
        .with_detail(stderr);
    }

    if let Some(expected) = exemplar.expected_stdout.as_deref() {
        if execution.stdout_truncated {
            return Outcome::new(
                exemplar,
                OutcomeKind::RuntimeMismatch,
                format!("output exceeded capture limit ({} bytes kept)", execution.stdout.len()),
            )
            .with_detail(stderr);
        }
        if !stdout_matches(expected, &execution.stdout) {
            return Outcome::new(
                exemplar,
                OutcomeKind::RuntimeMismatch,
                describe_mismatch(expected, &execution.stdout),
            )
            .with_detail(mismatch_detail(expected, &execution.stdout, &stderr));
        }
        return Outcome::new(exemplar, OutcomeKind::Pass, "stdout and exit code match");
    }

    Outcome::new(
        exemplar,
        OutcomeKind::Pass,
        format!("exit code {} (no stdout declared)", exit_code),
    )
}

/// Whether `actual` matches `expected` under address-wildcard normalization.
pub fn stdout_matches(expected: &[u8], actual: &[u8]) -> bool {
    let wildcard = ADDR_WILDCARD.as_bytes();
    if find(expected, wildcard).is_none() {
        return expected == actual;
    }
    match wildcard_regex(expected) {
        Ok(re) => re.is_match(actual),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid wildcard pattern; falling back to exact match");
            expected == actual
        }
    }
}

/// One-line description of the first difference.
pub fn describe_mismatch(expected: &[u8], actual: &[u8]) -> String {
    let expected_lines: Vec<&[u8]> = expected.split(|b| *b == b'\n').collect();
    let actual_lines: Vec<&[u8]> = actual.split(|b| *b == b'\n').collect();

    for (i, (exp, act)) in expected_lines.iter().zip(actual_lines.iter()).enumerate() {
        if !stdout_matches(exp, act) {
            return format!(
                "stdout line {}: expected {:?}, got {:?}",
                i + 1,
                String::from_utf8_lossy(exp),
                String::from_utf8_lossy(act)
            );
        }
    }

    format!(
        "stdout has {} line(s), expected {}",
        count_lines(actual),
        count_lines(expected)
    )
}

fn mismatch_detail(expected: &[u8], actual: &[u8], stderr: &str) -> String {
    let mut detail = format!(
        "--- expected stdout\n{}\n--- actual stdout\n{}",
        String::from_utf8_lossy(expected),
        String::from_utf8_lossy(actual)
    );
    if !stderr.is_empty() {
        detail.push_str("\n--- stderr\n");
        detail.push_str(stderr);
    }
    detail
}

fn wildcard_regex(expected: &[u8]) -> Result<Regex, regex::Error> {
    let wildcard = ADDR_WILDCARD.as_bytes();
    let mut pattern = String::from(r"(?s-u)\A");
    let mut rest = expected;
    while let Some(pos) = find(rest, wildcard) {
        escape_bytes(&rest[..pos], &mut pattern);
        pattern.push_str(ADDR_PATTERN);
        rest = &rest[pos + wildcard.len()..];
    }
    escape_bytes(rest, &mut pattern);
    pattern.push_str(r"\z");
    Regex::new(&pattern)
}

fn escape_bytes(bytes: &[u8], out: &mut String) {
    for &b in bytes {
        if b.is_ascii_alphanumeric() {
            out.push(b as char);
        } else {
            out.push_str(&format!(r"\x{:02X}", b));
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn count_lines(bytes: &[u8]) -> usize {
    let newlines = bytes.iter().filter(|b| **b == b'\n').count();
    match bytes.last() {
        None => 0,
        Some(b'\n') => newlines,
        Some(_) => newlines + 1,
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Conventional name for a terminating signal.
pub fn signal_name(signal: i32) -> String {
    #[cfg(unix)]
    {
        let name = match signal {
            libc::SIGSEGV => Some("SIGSEGV"),
            libc::SIGABRT => Some("SIGABRT"),
            libc::SIGFPE => Some("SIGFPE"),
            libc::SIGBUS => Some("SIGBUS"),
            libc::SIGILL => Some("SIGILL"),
            libc::SIGKILL => Some("SIGKILL"),
            libc::SIGTERM => Some("SIGTERM"),
            libc::SIGPIPE => Some("SIGPIPE"),
            _ => None,
        };
        if let Some(name) = name {
            return name.to_string();
        }
    }
    format!("signal {}", signal)
}
