//! Integration tests for the execution sandbox using shell-script artifacts.

use featcheck_core::compare::signal_name;
use featcheck_core::{ExecutionSandbox, HarnessFault, SandboxConfig};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Write an executable script through a child shell, so the test process
/// never holds a writable descriptor to the file it later executes.
async fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg("printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"")
        .arg("sh")
        .arg(format!("#!/bin/sh\n{}\n", body))
        .arg(&path)
        .status()
        .await
        .expect("spawn sh");
    assert!(status.success());
    path
}

fn sandbox(timeout_ms: u64, scratch: &Path) -> ExecutionSandbox {
    ExecutionSandbox::new(SandboxConfig {
        timeout_ms,
        max_output_bytes: 1024 * 1024,
        scratch_root: Some(scratch.to_path_buf()),
    })
}

/// Test: normal exit codes are reported as-is
#[tokio::test]
async fn test_exit_code_captured() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "seven", "echo out; echo err >&2; exit 7").await;

    let result = sandbox(5_000, dir.path()).execute(&bin).await.unwrap();
    assert_eq!(result.exit_code, Some(7));
    assert_eq!(result.signal, None);
    assert_eq!(result.stdout, b"out\n");
    assert_eq!(result.stderr, b"err\n");
    assert!(result.exited_normally());
    assert!(!result.timed_out);
}

/// Test: termination by signal has no exit code and names the signal
#[tokio::test]
async fn test_signal_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "segv", "printf partial; kill -SEGV $$").await;

    let result = sandbox(5_000, dir.path()).execute(&bin).await.unwrap();
    assert_eq!(result.exit_code, None);
    let signal = result.signal.expect("terminated by a signal");
    assert_eq!(signal_name(signal), "SIGSEGV");
    assert_eq!(result.stdout, b"partial");
    assert!(!result.timed_out);
}

/// Test: on timeout the whole process group is killed
#[tokio::test]
async fn test_timeout_kills_process_tree() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("leaked");
    let body = format!("(sleep 1; echo leaked > '{}') & sleep 30", marker.display());
    let bin = script(dir.path(), "spin", &body).await;

    let start = Instant::now();
    let result = sandbox(300, dir.path()).execute(&bin).await.unwrap();
    assert!(result.timed_out);
    assert_eq!(result.exit_code, None);
    assert!(start.elapsed() < Duration::from_secs(10));

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert!(!marker.exists(), "background child outlived the timeout");
}

/// Test: every run gets its own, empty, temporary working directory
#[tokio::test]
async fn test_working_directory_is_fresh_and_removed() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "where", "ls -A | wc -l | tr -d ' '; touch test.txt; pwd").await;
    let sandbox = sandbox(5_000, dir.path());

    let (a, b) = tokio::join!(sandbox.execute(&bin), sandbox.execute(&bin));
    let (a, b) = (a.unwrap(), b.unwrap());

    let parse = |stdout: &[u8]| {
        let text = String::from_utf8(stdout.to_vec()).unwrap();
        let mut lines = text.lines();
        let count = lines.next().unwrap().to_string();
        let cwd = PathBuf::from(lines.next().unwrap());
        (count, cwd)
    };
    let (count_a, cwd_a) = parse(&a.stdout);
    let (count_b, cwd_b) = parse(&b.stdout);

    assert_eq!(count_a, "0");
    assert_eq!(count_b, "0");
    assert_ne!(cwd_a, cwd_b);
    assert!(cwd_a.starts_with(dir.path().canonicalize().unwrap()) || cwd_a.starts_with(dir.path()));
    assert!(!cwd_a.exists());
    assert!(!cwd_b.exists());
}

/// Test: output bytes are captured verbatim
#[tokio::test]
async fn test_output_is_exact_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "bytes", "printf 'a\\r\\nb\\377'").await;

    let result = sandbox(5_000, dir.path()).execute(&bin).await.unwrap();
    assert_eq!(result.stdout, vec![b'a', b'\r', b'\n', b'b', 0xff]);
}

/// Test: output beyond the capture limit is drained and flagged
#[tokio::test]
async fn test_output_truncated_at_limit() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "flood", "head -c 200000 /dev/zero").await;

    let sandbox = ExecutionSandbox::new(SandboxConfig {
        timeout_ms: 5_000,
        max_output_bytes: 100,
        scratch_root: Some(dir.path().to_path_buf()),
    });
    let result = sandbox.execute(&bin).await.unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout.len(), 100);
    assert!(result.stdout_truncated);
    assert!(!result.stderr_truncated);
}

/// Test: the environment is minimal and stdin is closed
#[tokio::test]
async fn test_minimal_environment_and_closed_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "env", "echo \"[$HOME][$LANG][$LC_ALL]\"; cat; echo done").await;

    let result = sandbox(5_000, dir.path()).execute(&bin).await.unwrap();
    assert_eq!(result.stdout, b"[][C][C]\ndone\n");
}

/// Test: a missing artifact is reported on its own result, not as a fault
#[tokio::test]
async fn test_missing_artifact_is_not_launched() {
    let dir = tempfile::tempdir().unwrap();
    let result = sandbox(5_000, dir.path())
        .execute(&dir.path().join("missing"))
        .await
        .unwrap();
    assert!(result.launch_error.is_some());
    assert_eq!(result.exit_code, None);
    assert!(!result.exited_normally());
}

/// Test: an unusable scratch root is a harness fault
#[tokio::test]
async fn test_unusable_scratch_root_is_fault() {
    let dir = tempfile::tempdir().unwrap();
    let bin = script(dir.path(), "ok", "exit 0").await;
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();

    let err = sandbox(5_000, &blocker).execute(&bin).await.unwrap_err();
    assert!(matches!(err, HarnessFault::Scratch { .. }));
}

/// Test: a directory in place of the artifact is still a harness fault
#[tokio::test]
async fn test_directory_artifact_is_fault() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("artifact");
    std::fs::create_dir(&artifact).unwrap();
    std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o755)).unwrap();

    let err = sandbox(5_000, dir.path()).execute(&artifact).await.unwrap_err();
    assert!(matches!(err, HarnessFault::Spawn { .. }));
}
