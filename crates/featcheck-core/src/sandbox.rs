//! Execution sandbox: run one compiled artifact with bounded time, a private
//! working directory and captured output.
//!
//! Every child is spawned in its own process group. A [`ProcessGroup`] guard
//! kills the whole group on timeout and on every early exit path (including
//! cancellation of the surrounding task), so nothing outlives its exemplar.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::HarnessFault;

/// How long output readers may lag behind process exit before they are cut.
const READER_GRACE: Duration = Duration::from_secs(2);

/// Attempts made when the kernel reports the artifact as busy (`ETXTBSY`).
const SPAWN_ATTEMPTS: u32 = 3;

/// Base delay for backoff between spawn attempts.
const SPAWN_BACKOFF_BASE_MS: u64 = 20;

/// Configuration for sandboxed execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum wall-clock time for one exemplar run (milliseconds).
    pub timeout_ms: u64,
    /// Capture limit per stream; excess output is drained and dropped.
    pub max_output_bytes: usize,
    /// Directory under which per-exemplar scratch directories are created.
    /// Defaults to the system temporary directory.
    pub scratch_root: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_output_bytes: 1024 * 1024,
            scratch_root: None,
        }
    }
}

impl SandboxConfig {
    /// Resolved scratch root.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Execution timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Captured result of one artifact run. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Raw stdout bytes.
    pub stdout: Vec<u8>,

    /// Raw stderr bytes.
    pub stderr: Vec<u8>,

    /// Exit code of a normal return; `None` when terminated by a signal.
    pub exit_code: Option<i32>,

    /// Terminating signal, if any.
    pub signal: Option<i32>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,

    /// Whether the timeout expired and the process group was killed.
    pub timed_out: bool,

    /// Whether stdout exceeded the capture limit or was cut short.
    pub stdout_truncated: bool,

    /// Whether stderr exceeded the capture limit or was cut short.
    pub stderr_truncated: bool,

    /// Why the artifact could not be started, if it never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_error: Option<String>,
}

impl ExecutionResult {
    /// Whether the process returned normally (not killed, not timed out).
    pub fn exited_normally(&self) -> bool {
        !self.timed_out && self.exit_code.is_some()
    }

    /// Result for an artifact the kernel refused to start.
    fn not_launched(error: &std::io::Error) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            signal: None,
            duration_ms: 0,
            timed_out: false,
            stdout_truncated: false,
            stderr_truncated: false,
            launch_error: Some(error.to_string()),
        }
    }
}

/// Runs compiled artifacts, one private working directory per run.
#[derive(Debug, Clone)]
pub struct ExecutionSandbox {
    config: SandboxConfig,
}

impl ExecutionSandbox {
    /// Create a sandbox with the given configuration.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// The sandbox configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Execute `binary` in a fresh working directory.
    ///
    /// The working directory is removed when this returns, whatever the
    /// outcome. Only failures of the harness itself are errors.
    pub async fn execute(&self, binary: &Path) -> Result<ExecutionResult, HarnessFault> {
        let binary = absolutize(binary)?;
        let workdir = scratch_dir(&self.config.scratch_root(), "featcheck-run-")?;

        let mut attempt = 1;
        let captured = loop {
            let mut command = Command::new(&binary);
            command
                .current_dir(workdir.path())
                .env_clear()
                .env("PATH", "/usr/local/bin:/usr/bin:/bin")
                .env("LANG", "C")
                .env("LC_ALL", "C");

            match run_captured(command, self.config.timeout(), self.config.max_output_bytes).await
            {
                Ok(captured) => break captured,
                Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                    let delay = SPAWN_BACKOFF_BASE_MS * 2u64.pow(attempt - 1);
                    debug!(binary = %binary.display(), attempt, "Artifact busy, retrying spawn");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) if is_unrunnable(&e) => {
                    warn!(binary = %binary.display(), error = %e, "Artifact could not be executed");
                    return Ok(ExecutionResult::not_launched(&e));
                }
                Err(e) => {
                    return Err(HarnessFault::Spawn {
                        path: binary,
                        source: e,
                    })
                }
            }
        };

        if captured.timed_out {
            warn!(
                binary = %binary.display(),
                timeout_ms = self.config.timeout_ms,
                "Artifact timed out; process group killed"
            );
        }

        Ok(captured.into_execution_result())
    }
}

/// Raw result of a bounded child process run.
#[derive(Debug)]
pub(crate) struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: Option<ExitStatus>,
    pub timed_out: bool,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration: Duration,
}

impl Captured {
    /// Whether the child exited normally with status 0.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.map(|s| s.success()).unwrap_or(false)
    }

    fn into_execution_result(self) -> ExecutionResult {
        let exit_code = if self.timed_out {
            None
        } else {
            self.status.and_then(|s| s.code())
        };
        ExecutionResult {
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code,
            signal: self.status.and_then(exit_signal),
            duration_ms: self.duration.as_millis() as u64,
            timed_out: self.timed_out,
            stdout_truncated: self.stdout_truncated,
            stderr_truncated: self.stderr_truncated,
            launch_error: None,
        }
    }
}

/// Spawn `command` in its own process group, capture both streams (capped at
/// `max_output` bytes each) and enforce `timeout`.
///
/// Returns an `io::Error` only if the child could not be spawned or waited on.
pub(crate) async fn run_captured(
    mut command: Command,
    timeout: Duration,
    max_output: usize,
) -> std::io::Result<Captured> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let start = Instant::now();
    let mut child = command.spawn()?;
    let mut group = ProcessGroup::new(child.id());

    let stdout = child.stdout.take().map(|out| spawn_reader(out, max_output));
    let stderr = child.stderr.take().map(|err| spawn_reader(err, max_output));

    let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            group.disarm();
            (Some(status?), false)
        }
        Err(_elapsed) => {
            group.kill();
            let _ = child.start_kill();
            (child.wait().await.ok(), true)
        }
    };
    let duration = start.elapsed();

    let (stdout, stdout_truncated) = collect_reader(stdout).await;
    let (stderr, stderr_truncated) = collect_reader(stderr).await;

    Ok(Captured {
        stdout,
        stderr,
        status,
        timed_out,
        stdout_truncated,
        stderr_truncated,
        duration,
    })
}

/// Create a uniquely-named scratch directory under `root`.
pub(crate) fn scratch_dir(root: &Path, prefix: &str) -> Result<tempfile::TempDir, HarnessFault> {
    let scratch_err = |e| HarnessFault::Scratch {
        root: root.to_path_buf(),
        source: e,
    };
    std::fs::create_dir_all(root).map_err(scratch_err)?;
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(root)
        .map_err(scratch_err)
}

/// Make `path` absolute against the current directory.
pub(crate) fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Bytes read from one child stream so far. Shared with the reader task so a
/// reader cut off after the grace period still yields what it captured.
#[derive(Debug, Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

struct Reader {
    capture: SharedCapture,
    handle: JoinHandle<std::io::Result<()>>,
}

fn spawn_reader<R>(reader: R, cap: usize) -> Reader
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let capture = SharedCapture::default();
    let handle = tokio::spawn(read_capped(reader, cap, Arc::clone(&capture)));
    Reader { capture, handle }
}

async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: usize,
    capture: SharedCapture,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let mut capture = lock(&capture);
        let keep = n.min(cap.saturating_sub(capture.bytes.len()));
        capture.bytes.extend_from_slice(&chunk[..keep]);
        if keep < n {
            capture.truncated = true;
        }
    }
}

async fn collect_reader(reader: Option<Reader>) -> (Vec<u8>, bool) {
    let Some(Reader {
        capture,
        mut handle,
    }) = reader
    else {
        return (Vec::new(), false);
    };
    let complete = match tokio::time::timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(Ok(()))) => true,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Failed reading child output");
            false
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Output reader task failed");
            false
        }
        Err(_) => {
            // A descendant that outlived the leader still holds the pipe open.
            handle.abort();
            false
        }
    };
    let mut capture = lock(&capture);
    let bytes = std::mem::take(&mut capture.bytes);
    (bytes, capture.truncated || !complete)
}

fn lock(capture: &SharedCapture) -> MutexGuard<'_, Capture> {
    capture
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Spawn errors that belong to the artifact rather than the harness: the
/// file is missing or is not a format the kernel can execute.
fn is_unrunnable(e: &std::io::Error) -> bool {
    if e.kind() == std::io::ErrorKind::NotFound {
        return true;
    }
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::ENOEXEC)
    }
    #[cfg(not(unix))]
    {
        false
    }
}

fn is_text_busy(e: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::ETXTBSY)
    }
    #[cfg(not(unix))]
    {
        let _ = e;
        false
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Kills a child's process group unless disarmed after a normal exit.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// The leader exited on its own; the group id may be reused after reaping.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            let Ok(pgid) = libc::pid_t::try_from(pgid) else {
                return;
            };
            // SAFETY: killpg has no memory-safety preconditions; the group was
            // created for this child and its leader has not been reaped yet.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
