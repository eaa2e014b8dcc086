//! Build adapter: turn one exemplar's source into an executable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::HarnessFault;
use crate::registry::Exemplar;
use crate::sandbox::{absolutize, run_captured, scratch_dir};
use crate::toolchain::ToolchainConfig;

/// Capture limit for compiler diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 256 * 1024;

/// Timeout for the `--version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of building one exemplar.
///
/// Owns the scoped build directory: dropping the artifact deletes the binary
/// and every intermediate file, whatever the outcome of the run.
#[derive(Debug)]
pub struct BuildArtifact {
    /// Exemplar this artifact was built from.
    pub exemplar_id: String,

    /// Compiled binary (absent on failure).
    pub binary: Option<PathBuf>,

    /// Verbatim toolchain diagnostics (stderr, then stdout).
    pub diagnostics: String,

    /// Whether the build produced a runnable binary.
    pub success: bool,

    /// Build duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the build timeout expired.
    pub timed_out: bool,

    workdir: Option<tempfile::TempDir>,
}

impl BuildArtifact {
    /// A successful build of `binary`, kept alive by `workdir` if given.
    pub fn built(
        exemplar_id: impl Into<String>,
        binary: PathBuf,
        workdir: Option<tempfile::TempDir>,
    ) -> Self {
        Self {
            exemplar_id: exemplar_id.into(),
            binary: Some(binary),
            diagnostics: String::new(),
            success: true,
            duration_ms: 0,
            timed_out: false,
            workdir,
        }
    }

    /// A failed build with the given diagnostics.
    pub fn failed(exemplar_id: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            exemplar_id: exemplar_id.into(),
            binary: None,
            diagnostics: diagnostics.into(),
            success: false,
            duration_ms: 0,
            timed_out: false,
            workdir: None,
        }
    }

    /// Path to the runnable binary, only when the build succeeded.
    pub fn binary(&self) -> Option<&Path> {
        if self.success {
            self.binary.as_deref()
        } else {
            None
        }
    }

    /// The scoped build directory, if this artifact owns one.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(|d| d.path())
    }
}

/// Turns exemplar sources into executables.
///
/// Compile failure is a normal result (`success == false`); an `Err` means the
/// harness itself is broken (toolchain missing, scratch space unusable).
#[async_trait]
pub trait BuildAdapter: Send + Sync {
    /// Build one exemplar into a fresh, exclusively-owned directory.
    async fn build(&self, exemplar: &Exemplar) -> Result<BuildArtifact, HarnessFault>;

    /// Human-readable toolchain identity, checked once before scheduling.
    async fn identify(&self) -> Result<String, HarnessFault> {
        Ok("unknown".to_string())
    }
}

/// [`BuildAdapter`] that shells out to a configured compiler.
#[derive(Debug, Clone)]
pub struct ToolchainBuilder {
    toolchain: ToolchainConfig,
    root: PathBuf,
    scratch_root: PathBuf,
}

impl ToolchainBuilder {
    /// Build sources under `root` with `toolchain`, scratch space in `scratch_root`.
    pub fn new(toolchain: ToolchainConfig, root: PathBuf, scratch_root: PathBuf) -> Self {
        Self {
            toolchain,
            root,
            scratch_root,
        }
    }

    /// The toolchain configuration in use.
    pub fn toolchain(&self) -> &ToolchainConfig {
        &self.toolchain
    }

    fn unavailable(&self, source: std::io::Error) -> HarnessFault {
        HarnessFault::ToolchainUnavailable {
            program: self.toolchain.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl BuildAdapter for ToolchainBuilder {
    async fn build(&self, exemplar: &Exemplar) -> Result<BuildArtifact, HarnessFault> {
        let workdir = scratch_dir(&self.scratch_root, "featcheck-build-")?;
        let src = absolutize(&exemplar.source)?;
        let root = absolutize(&self.root)?;
        let out = workdir.path().join(exemplar.stem());

        let args = self.toolchain.render_args(&src, &out, &root);
        debug!(exemplar = %exemplar.id, program = %self.toolchain.program, ?args, "Building exemplar");

        let mut command = Command::new(&self.toolchain.program);
        command
            .args(&args)
            .current_dir(workdir.path())
            .env("TMPDIR", workdir.path());

        let timeout = Duration::from_secs(self.toolchain.timeout_secs);
        let captured = run_captured(command, timeout, MAX_DIAGNOSTIC_BYTES)
            .await
            .map_err(|e| self.unavailable(e))?;

        let mut diagnostics = String::from_utf8_lossy(&captured.stderr).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&captured.stdout));
        if captured.timed_out {
            if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&format!(
                "build timed out after {}s",
                self.toolchain.timeout_secs
            ));
        }

        let success = captured.succeeded() && out.is_file();
        if captured.succeeded() && !success && diagnostics.is_empty() {
            diagnostics = format!("toolchain reported success but produced no {}", out.display());
        }

        Ok(BuildArtifact {
            exemplar_id: exemplar.id.clone(),
            binary: success.then_some(out),
            diagnostics,
            success,
            duration_ms: captured.duration.as_millis() as u64,
            timed_out: captured.timed_out,
            workdir: Some(workdir),
        })
    }

    async fn identify(&self) -> Result<String, HarnessFault> {
        let mut command = Command::new(&self.toolchain.program);
        command.arg("--version");
        let captured = run_captured(command, PROBE_TIMEOUT, 64 * 1024)
            .await
            .map_err(|e| self.unavailable(e))?;

        let text = if captured.stdout.is_empty() {
            captured.stderr
        } else {
            captured.stdout
        };
        let identity = String::from_utf8_lossy(&text)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty() && captured.status.map(|s| s.success()).unwrap_or(false));

        Ok(identity.unwrap_or_else(|| "unknown".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::BuiltinToolchain;

    fn exemplar(dir: &Path, name: &str, body: &str) -> Exemplar {
        let source = dir.join(name);
        std::fs::write(&source, body).unwrap();
        Exemplar {
            id: format!("tests/{}", name),
            category: "tests".to_string(),
            source,
            expected_stdout: None,
            expected_exit: 0,
        }
    }

    #[test]
    fn test_failed_artifact_has_no_binary() {
        let artifact = BuildArtifact::failed("tests/x.c", "error: expected ';'");
        assert!(!artifact.success);
        assert!(artifact.binary().is_none());
        assert!(artifact.workdir().is_none());
        assert!(artifact.diagnostics.contains("expected ';'"));
    }

    #[test]
    fn test_built_artifact_owns_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let artifact = BuildArtifact::built("tests/x.c", path.join("x"), Some(dir));
        assert_eq!(artifact.workdir(), Some(path.as_path()));
        drop(artifact);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_a_fault() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ex = exemplar(src_dir.path(), "a.c", "int main(void) { return 0; }\n");

        let builder = ToolchainBuilder::new(
            ToolchainConfig::custom("featcheck-no-such-cc".to_string(), vec!["{src}".to_string()], 5),
            src_dir.path().to_path_buf(),
            scratch.path().to_path_buf(),
        );

        let err = builder.build(&ex).await.unwrap_err();
        assert!(matches!(err, HarnessFault::ToolchainUnavailable { .. }));
        assert!(matches!(
            builder.identify().await.unwrap_err(),
            HarnessFault::ToolchainUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_nonzero_toolchain_exit_is_compile_failure() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ex = exemplar(src_dir.path(), "b.c", "int main(void) { return 0; }\n");

        // `sh -c '...' sh <src>` stands in for a compiler that rejects the input.
        let builder = ToolchainBuilder::new(
            ToolchainConfig::custom(
                "sh".to_string(),
                vec![
                    "-c".to_string(),
                    "echo \"$1:1:1: error: boom\" >&2; exit 1".to_string(),
                    "sh".to_string(),
                    "{src}".to_string(),
                ],
                5,
            ),
            src_dir.path().to_path_buf(),
            scratch.path().to_path_buf(),
        );

        let artifact = builder.build(&ex).await.unwrap();
        assert!(!artifact.success);
        assert!(artifact.binary().is_none());
        assert!(artifact.diagnostics.contains("error: boom"));
        assert!(artifact.diagnostics.contains("b.c"));
    }

    #[tokio::test]
    async fn test_build_timeout_is_compile_failure() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ex = exemplar(src_dir.path(), "c.c", "int main(void) { return 0; }\n");

        let mut toolchain =
            ToolchainConfig::custom("sh".to_string(), vec!["-c".to_string(), "sleep 30".to_string()], 1);
        toolchain.timeout_secs = 1;
        let builder = ToolchainBuilder::new(
            toolchain,
            src_dir.path().to_path_buf(),
            scratch.path().to_path_buf(),
        );

        let artifact = builder.build(&ex).await.unwrap();
        assert!(!artifact.success);
        assert!(artifact.timed_out);
        assert!(artifact.diagnostics.contains("timed out"));
    }

    #[tokio::test]
    async fn test_builds_use_distinct_directories() {
        let src_dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let ex = exemplar(src_dir.path(), "d.c", "int main(void) { return 0; }\n");

        // A "compiler" that copies a script into {out}.
        let builder = ToolchainBuilder::new(
            ToolchainConfig::custom(
                "sh".to_string(),
                vec![
                    "-c".to_string(),
                    "printf '#!/bin/sh\\nexit 0\\n' > \"$1\" && chmod +x \"$1\"".to_string(),
                    "sh".to_string(),
                    "{out}".to_string(),
                ],
                5,
            ),
            src_dir.path().to_path_buf(),
            scratch.path().to_path_buf(),
        );

        let (a, b) = tokio::join!(builder.build(&ex), builder.build(&ex));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(a.success && b.success);
        assert_ne!(a.binary().unwrap(), b.binary().unwrap());
        assert_ne!(a.workdir(), b.workdir());
    }

    #[test]
    fn test_builder_keeps_toolchain() {
        let builder = ToolchainBuilder::new(
            ToolchainConfig::from_builtin(BuiltinToolchain::Clang, 30),
            PathBuf::from("corpus"),
            std::env::temp_dir(),
        );
        assert_eq!(builder.toolchain().program, "clang");
    }
}
