use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long output readers may lag behind the child's exit
const PIPE_GRACE: Duration = Duration::from_secs(1);

/// Limits enforced on a single child process
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    /// The child is killed once this much wall time has passed
    pub wall_time: Duration,
    /// Captured bytes per stream; the rest is drained and discarded
    pub output_bytes: u64,
}

/// Everything needed to launch one child, without touching ambient state
///
/// The child inherits the server's environment plus `env`; nothing is ever
/// written back to the server's own environment.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Written to the child then closed; `None` attaches `/dev/null`
    pub stdin: Option<String>,
    pub env: Vec<(String, String)>,
    pub limits: ResourceLimits,
}

impl ProcessSpec {
    /// Builds a spec from `[program, args...]`
    pub fn from_command(
        command: &[String],
        working_dir: impl AsRef<Path>,
        limits: ResourceLimits,
    ) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("Empty command");
        };

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            working_dir: working_dir.as_ref().to_path_buf(),
            stdin: None,
            env: Vec::new(),
            limits,
        })
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// `None` when killed by a signal or on timeout
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub timed_out: bool,
    pub truncated: bool,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs `spec` to completion or until its wall time runs out
///
/// Errors are reserved for failures to launch or talk to the child. A child
/// that exits non-zero or times out still yields an `ExecutionOutcome`.
pub async fn execute(spec: &ProcessSpec) -> Result<ExecutionOutcome> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&spec.working_dir)
        .stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group, so a timeout also reaches the compiler's JVM
    #[cfg(unix)]
    cmd.process_group(0);

    let start_time = Instant::now();
    let mut child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn `{}`", spec.program))?;
    let pid = child.id();

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take().context("Child stdout was not captured")?;
    let stderr_pipe = child.stderr.take().context("Child stderr was not captured")?;
    let input = spec.stdin.as_deref().unwrap_or_default().as_bytes();
    let limit = spec.limits.output_bytes;

    // Readers outlive a timeout so whatever was printed before the kill is kept
    let stdout_task = tokio::spawn(read_capped(stdout_pipe, limit));
    let stderr_task = tokio::spawn(read_capped(stderr_pipe, limit));

    let waited = timeout(spec.limits.wall_time, async {
        let (fed, status) = tokio::join!(feed_stdin(stdin_pipe, input), child.wait());
        fed?;
        anyhow::Ok(status?)
    })
    .await;

    let (exit_code, timed_out) = match waited {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            kill_process_group(pid);
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill `{}` after timeout: {e}", spec.program);
            }
            log::info!(
                "`{}` killed after exceeding {:?}",
                spec.program,
                spec.limits.wall_time
            );
            (None, true)
        }
    };

    let (stdout, stdout_truncated) = collect_output(stdout_task).await?;
    let (stderr, stderr_truncated) = collect_output(stderr_task).await?;
    let truncated = stdout_truncated || stderr_truncated;
    if truncated {
        log::warn!(
            "Output of `{}` exceeded {limit} bytes and was truncated",
            spec.program
        );
    }

    Ok(ExecutionOutcome {
        exit_code,
        stdout,
        stderr,
        elapsed: start_time.elapsed(),
        timed_out,
        truncated,
    })
}

/// Waits for a reader task once the child is gone
///
/// A straggler that inherited the pipe can keep it open, so the wait is
/// bounded and the reader is abandoned past `PIPE_GRACE`.
async fn collect_output(
    mut reader: JoinHandle<std::io::Result<(String, bool)>>,
) -> Result<(String, bool)> {
    match timeout(PIPE_GRACE, &mut reader).await {
        Ok(joined) => Ok(joined.context("Output reader failed")??),
        Err(_) => {
            reader.abort();
            log::warn!("Output pipe still open {PIPE_GRACE:?} after exit, dropping it");
            Ok((String::new(), true))
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // SAFETY: plain syscall; the group was created for this still unreaped child
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Writes `input` and closes the pipe so the child sees end of file
async fn feed_stdin(pipe: Option<ChildStdin>, input: &[u8]) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };

    // A child that exits without reading its input is not an error
    if let Err(e) = pipe.write_all(input).await
        && e.kind() != ErrorKind::BrokenPipe
    {
        return Err(e);
    }
    drop(pipe);
    Ok(())
}

/// Reads at most `limit` bytes, then drains the rest so the child never blocks
async fn read_capped<R: AsyncRead + Unpin>(
    mut reader: R,
    limit: u64,
) -> std::io::Result<(String, bool)> {
    let mut buf = Vec::new();
    (&mut reader).take(limit).read_to_end(&mut buf).await?;
    let discarded = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    Ok((String::from_utf8_lossy(&buf).into_owned(), discarded > 0))
}
