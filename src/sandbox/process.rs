//! Plain-process sandbox backend.
//!
//! Runs each execution in a throwaway scratch directory with piped
//! stdio, a hard wall-clock kill and an `ulimit -v` ceiling. Suitable
//! for development and tests; production deployments should select the
//! `isolate` backend, which adds network and filesystem isolation.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::languages::LanguageProfile;
use super::{clip, ExecError, ExecOutcome, ResourceLimits, Sandbox};
use crate::db::types::Language;

const COMPILE_TIMEOUT: Duration = Duration::from_secs(30);
const DIAGNOSTIC_LIMIT: usize = 4096;

#[derive(Debug, Default)]
pub(crate) struct ProcessSandbox;

impl ProcessSandbox {
    pub(crate) fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(
        &self,
        language: Language,
        code: &str,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<ExecOutcome, ExecError> {
        let profile = LanguageProfile::for_language(language);

        let scratch = tempfile::Builder::new()
            .prefix("codequest-run-")
            .tempdir()
            .map_err(|err| ExecError::Fault(format!("failed to provision scratch dir: {err}")))?;

        tokio::fs::write(scratch.path().join(profile.source_filename), code)
            .await
            .map_err(|err| ExecError::Fault(format!("failed to write source file: {err}")))?;

        if let Some(argv) = profile.compile_argv() {
            compile(scratch.path(), &argv).await?;
        }

        run_program(scratch.path(), language, &profile.run_argv(), input, limits).await
    }
}

async fn compile(dir: &std::path::Path, argv: &[String]) -> Result<(), ExecError> {
    let mut command = Command::new(&argv[0]);
    command
        .args(&argv[1..])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(COMPILE_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return Err(ExecError::Fault(format!("failed to spawn compiler {}: {err}", argv[0])));
        }
        Err(_) => {
            return Err(ExecError::Compile(format!(
                "compilation exceeded {}s",
                COMPILE_TIMEOUT.as_secs()
            )));
        }
    };

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(ExecError::Compile(clip(&format!("{stderr}{stdout}"), DIAGNOSTIC_LIMIT)))
}

async fn run_program(
    dir: &std::path::Path,
    language: Language,
    argv: &[String],
    input: &str,
    limits: ResourceLimits,
) -> Result<ExecOutcome, ExecError> {
    let mut command = limited_command(language, argv, limits.memory_bytes);
    command
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|err| ExecError::Fault(format!("failed to spawn {}: {err}", argv[0])))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| ExecError::Fault("child stdin not captured".to_string()))?;
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| ExecError::Fault("child stdout not captured".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| ExecError::Fault("child stderr not captured".to_string()))?;

    let input = input.as_bytes().to_vec();
    // Writes can block on a full pipe if the program never reads, so
    // stdin is fed concurrently with the wait.
    let stdin_task = tokio::spawn(async move {
        let _ = stdin.write_all(&input).await;
        let _ = stdin.shutdown().await;
    });
    let stdout_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buffer).await;
        buffer
    });
    let stderr_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buffer).await;
        buffer
    });

    let started = Instant::now();
    let status = match timeout(limits.wall_time, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            return Err(ExecError::Fault(format!("failed to wait for child: {err}")));
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            stdin_task.abort();
            return Err(ExecError::Timeout);
        }
    };
    let duration = started.elapsed();

    let _ = stdin_task.await;
    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

    if !status.success() {
        if killed_by_oom(&status) {
            return Err(ExecError::MemoryExceeded);
        }
        let detail = match status.code() {
            Some(code) => format!("exit code {code}: {}", clip(stderr.trim(), DIAGNOSTIC_LIMIT)),
            None => format!("terminated by signal: {}", clip(stderr.trim(), DIAGNOSTIC_LIMIT)),
        };
        return Err(ExecError::Runtime { detail, stdout: clip(&stdout, DIAGNOSTIC_LIMIT) });
    }

    Ok(ExecOutcome { stdout, stderr, duration })
}

/// The address-space rlimit is applied through a thin shell wrapper.
/// The JVM reserves large virtual mappings up front, so Java runs
/// without the rlimit here; the isolate backend enforces its ceiling
/// through cgroups instead.
fn limited_command(language: Language, argv: &[String], memory_bytes: u64) -> Command {
    if cfg!(unix) && language != Language::Java {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg("ulimit -v \"$1\" 2>/dev/null; shift; exec \"$@\"")
            .arg("sh")
            .arg((memory_bytes / 1024).to_string())
            .args(argv);
        command
    } else {
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]);
        command
    }
}

#[cfg(unix)]
fn killed_by_oom(status: &std::process::ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    // An rlimit breach or the kernel OOM killer surfaces as SIGKILL.
    status.signal() == Some(9)
}

#[cfg(not(unix))]
fn killed_by_oom(_status: &std::process::ExitStatus) -> bool {
    false
}
