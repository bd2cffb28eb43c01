use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::broker::{NormalizedResult, Status};
use crate::config::LocalConfig;

use super::process::{ExecutionOutcome, ProcessSpec, ResourceLimits, execute};
use super::session::SandboxSession;

/// Extra time the broker grants on top of the compile and run limits
const DEADLINE_SLACK: Duration = Duration::from_secs(5);

/// Compiles and runs untrusted Kotlin in a fresh workspace per request
///
/// Every call gets its own `SandboxSession`; the compiler and the program
/// run as child processes bounded by wall-clock timeouts, and the program's
/// JVM heap is capped through `-Xmx`.
pub struct SandboxExecutor {
    config: LocalConfig,
    workspace_root: PathBuf,
    admission: Option<Arc<Semaphore>>,
}

impl SandboxExecutor {
    pub fn new(config: LocalConfig) -> Self {
        let workspace_root = config
            .workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let admission = config
            .max_concurrent_sessions
            .map(|permits| Arc::new(Semaphore::new(permits.max(1))));

        Self {
            config,
            workspace_root,
            admission,
        }
    }

    /// How long one admitted `run` may take at most, compile and execution included
    ///
    /// With a session limit the bounded wait for a slot is added on top, so a
    /// queued request is never cut short while it is still within its limits.
    pub fn deadline(&self) -> Duration {
        let work = self.config.compile_time_limit.as_duration()
            + self.config.run_time_limit.as_duration()
            + DEADLINE_SLACK;
        match self.admission {
            Some(_) => work + self.config.admission_timeout.as_duration(),
            None => work,
        }
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }

    /// Whether the compiler named in the compile command can be found
    pub fn toolchain_available(&self) -> bool {
        self.config
            .compile_command
            .first()
            .is_some_and(|program| find_program(program).is_some())
    }

    /// Waits for a session slot, giving up after `admission_timeout`
    ///
    /// Returns `None` when sessions are unbounded. The permit must be held for
    /// the whole of `run_admitted`.
    pub async fn admit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(semaphore) = &self.admission else {
            return Ok(None);
        };

        let wait = self.config.admission_timeout.as_duration();
        match timeout(wait, semaphore.clone().acquire_owned()).await {
            Ok(permit) => Ok(Some(permit?)),
            Err(_) => Err(anyhow!(
                "No sandbox slot freed up within {:.1}s",
                wait.as_secs_f64()
            )),
        }
    }

    /// Compile `source_code`, run it against `stdin`, and always clean up
    ///
    /// A request that cannot get a session slot in time ends as an internal error.
    pub async fn run(&self, source_code: &str, stdin: &str) -> NormalizedResult {
        let _permit = match self.admit().await {
            Ok(permit) => permit,
            Err(e) => return internal_error(e),
        };

        self.run_admitted(source_code, stdin).await
    }

    /// Like `run`, for callers already holding the permit from `admit`
    pub async fn run_admitted(&self, source_code: &str, stdin: &str) -> NormalizedResult {
        let session = match SandboxSession::create(
            &self.workspace_root,
            &self.config.source_file,
            &self.config.artifact_file,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => return internal_error(e),
        };

        let result = match self.run_in_session(&session, source_code, stdin).await {
            Ok(result) => result,
            Err(e) => internal_error(e),
        };
        session.cleanup().await;
        result
    }

    async fn run_in_session(
        &self,
        session: &SandboxSession,
        source_code: &str,
        stdin: &str,
    ) -> Result<NormalizedResult> {
        session.write_source(source_code).await?;

        // Step 1: Compile the source code
        let compiled = execute(&self.compile_spec(session)?).await?;
        if !compiled.success() {
            log::info!("Session {} failed to compile", session.id());
            return Ok(self.compilation_error(compiled));
        }
        if !session.artifact_path().exists() {
            return Ok(NormalizedResult::failure(
                Status::CompilationError,
                "Compilation produced no artifact",
            )
            .with_elapsed(compiled.elapsed.as_secs_f64()));
        }

        // Step 2: Run the artifact
        let ran = execute(&self.run_spec(session, stdin)?).await?;
        log::info!(
            "Session {} finished in {:.3}s with exit code {:?}",
            session.id(),
            ran.elapsed.as_secs_f64(),
            ran.exit_code
        );

        Ok(self.run_result(ran))
    }

    fn compile_spec(&self, session: &SandboxSession) -> Result<ProcessSpec> {
        let heap = self.config.compile_memory_limit.map(|mb| mb.0.to_string());
        let command = self.generate_command(&self.config.compile_command, session, heap.as_deref());
        let limits = ResourceLimits {
            wall_time: self.config.compile_time_limit.as_duration(),
            output_bytes: self.config.output_limit.0,
        };

        let spec = ProcessSpec::from_command(&command, session.workspace_dir(), limits)?;
        Ok(match heap {
            Some(heap) => spec.with_env("JAVA_OPTS", format!("-Xmx{heap}m")),
            None => spec,
        })
    }

    fn run_spec(&self, session: &SandboxSession, stdin: &str) -> Result<ProcessSpec> {
        let heap = self.config.run_memory_limit.0.to_string();
        let command = self.generate_command(&self.config.run_command, session, Some(&heap));
        let limits = ResourceLimits {
            wall_time: self.config.run_time_limit.as_duration(),
            output_bytes: self.config.output_limit.0,
        };

        Ok(ProcessSpec::from_command(&command, session.workspace_dir(), limits)?.with_stdin(stdin))
    }

    /// Applies the `%INPUT%`, `%OUTPUT%` and `%HEAP%` substitutions
    fn generate_command(
        &self,
        template: &[String],
        session: &SandboxSession,
        heap: Option<&str>,
    ) -> Vec<String> {
        let source = session.source_path().to_string_lossy();
        let artifact = session.artifact_path().to_string_lossy();

        let mut mapping = HashMap::<&str, &str>::new();
        mapping.insert("%INPUT%", &source);
        mapping.insert("%OUTPUT%", &artifact);
        if let Some(heap) = heap {
            mapping.insert("%HEAP%", heap);
        }

        apply_template(template, &mapping)
    }

    fn compilation_error(&self, compiled: ExecutionOutcome) -> NormalizedResult {
        let error = if compiled.timed_out {
            format!(
                "Compilation timed out after {:.1}s",
                self.config.compile_time_limit.as_duration().as_secs_f64()
            )
        } else if !compiled.stderr.is_empty() {
            compiled.stderr
        } else if !compiled.stdout.is_empty() {
            compiled.stdout
        } else {
            "Compilation failed".to_string()
        };

        NormalizedResult::failure(Status::CompilationError, error)
            .with_elapsed(compiled.elapsed.as_secs_f64())
    }

    fn run_result(&self, ran: ExecutionOutcome) -> NormalizedResult {
        let elapsed = ran.elapsed.as_secs_f64();

        if ran.timed_out {
            let limit = self.config.run_time_limit.as_duration().as_secs_f64();
            return NormalizedResult::failure(
                Status::RuntimeError,
                format!("Time limit exceeded ({limit:.1}s)"),
            )
            .with_output(ran.stdout)
            .with_elapsed(elapsed);
        }

        if ran.success() {
            return NormalizedResult::accepted(ran.stdout)
                .with_error(ran.stderr)
                .with_elapsed(elapsed);
        }

        let error = if ran.stderr.is_empty() {
            match ran.exit_code {
                Some(code) => format!("Process exited with code {code}"),
                None => "Process terminated by a signal".to_string(),
            }
        } else {
            ran.stderr
        };
        NormalizedResult::failure(Status::RuntimeError, error)
            .with_output(ran.stdout)
            .with_elapsed(elapsed)
    }
}

fn internal_error(e: anyhow::Error) -> NormalizedResult {
    log::error!("Sandbox failure: {e:#}");
    NormalizedResult::failure(Status::InternalError, format!("Internal error: {e:#}"))
}

/// Replaces every placeholder of `mapping` in each template argument
fn apply_template(template: &[String], mapping: &HashMap<&str, &str>) -> Vec<String> {
    template
        .iter()
        .map(|s| {
            let mut t = s.clone();
            for (k, v) in mapping.iter() {
                t = t.replace(k, v);
            }
            t
        })
        .collect()
}

/// Resolves `program` the way a shell would, without spawning anything
fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(program))
            .find(|path| is_executable(path))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::MilliSecond;

    #[test]
    fn test_apply_template() {
        let template = ["kotlinc", "%INPUT%", "-d", "%OUTPUT%", "-J-Xmx%HEAP%m"].map(String::from);
        let mut mapping = HashMap::new();
        mapping.insert("%INPUT%", "/tmp/w/Main.kt");
        mapping.insert("%OUTPUT%", "/tmp/w/program.jar");
        mapping.insert("%HEAP%", "256");
        assert_eq!(
            apply_template(&template, &mapping),
            vec!["kotlinc", "/tmp/w/Main.kt", "-d", "/tmp/w/program.jar", "-J-Xmx256m"]
        );
    }

    #[test]
    fn test_deadline_covers_both_stages() {
        let config = LocalConfig {
            compile_time_limit: MilliSecond(10_000),
            run_time_limit: MilliSecond(15_000),
            ..LocalConfig::default()
        };
        let executor = SandboxExecutor::new(config);
        assert_eq!(executor.deadline(), Duration::from_secs(30));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_program() {
        assert!(find_program("sh").is_some());
        assert!(find_program("/bin/sh").is_some());
        assert!(find_program("ktjudge-no-such-compiler").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_program_requires_execute_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let compiler = dir.path().join("kotlinc");
        std::fs::write(&compiler, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o644)).unwrap();
        let path = compiler.to_string_lossy().into_owned();
        assert_eq!(find_program(&path), None);

        std::fs::set_permissions(&compiler, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(find_program(&path), Some(compiler));
    }

    #[test]
    fn test_deadline_includes_admission_wait() {
        let config = LocalConfig {
            compile_time_limit: MilliSecond(10_000),
            run_time_limit: MilliSecond(15_000),
            max_concurrent_sessions: Some(2),
            admission_timeout: MilliSecond(20_000),
            ..LocalConfig::default()
        };
        assert_eq!(
            SandboxExecutor::new(config).deadline(),
            Duration::from_secs(50)
        );
    }

    #[test]
    fn test_missing_toolchain_is_reported() {
        let config = LocalConfig {
            compile_command: vec!["ktjudge-no-such-compiler".to_string()],
            ..LocalConfig::default()
        };
        assert!(!SandboxExecutor::new(config).toolchain_available());
    }
}
