//! Production sandbox backend driving the `isolate` binary.
//!
//! Each execution claims a box id from a fixed pool, provisions the
//! box with `--init`, runs the program under cgroup memory and
//! wall-clock limits with networking disabled, then reclaims the box
//! with `--cleanup`. Verdicts are read from isolate's meta file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{Mutex, Semaphore};

use super::languages::LanguageProfile;
use super::{clip, ExecError, ExecOutcome, ResourceLimits, Sandbox};
use crate::db::types::Language;

const COMPILE_WALL_TIME_SECS: f64 = 30.0;
const DIAGNOSTIC_LIMIT: usize = 4096;

const STDIN_FILE: &str = "stdin.txt";
const STDOUT_FILE: &str = "stdout.txt";
const STDERR_FILE: &str = "stderr.txt";

pub(crate) struct IsolateSandbox {
    bin: String,
    free_boxes: Mutex<Vec<u32>>,
    available: Semaphore,
}

impl IsolateSandbox {
    pub(crate) fn new(bin: String, boxes: u32) -> Self {
        Self {
            bin,
            free_boxes: Mutex::new((0..boxes).collect()),
            available: Semaphore::new(boxes as usize),
        }
    }

    async fn claim_box(&self) -> Result<u32, ExecError> {
        let permit = self
            .available
            .acquire()
            .await
            .map_err(|_| ExecError::Fault("isolate box pool closed".to_string()))?;
        permit.forget();
        let box_id = self.free_boxes.lock().await.pop();
        box_id.ok_or_else(|| ExecError::Fault("isolate box pool exhausted".to_string()))
    }

    async fn release_box(&self, box_id: u32) {
        if let Err(err) = self.cleanup_box(box_id).await {
            tracing::warn!(box_id, error = %err, "Failed to clean up isolate box");
        }
        self.free_boxes.lock().await.push(box_id);
        self.available.add_permits(1);
    }

    async fn init_box(&self, box_id: u32) -> Result<PathBuf, ExecError> {
        let output = Command::new(&self.bin)
            .arg(format!("--box-id={box_id}"))
            .arg("--cg")
            .arg("--init")
            .output()
            .await
            .map_err(|err| ExecError::Fault(format!("failed to execute isolate --init: {err}")))?;

        if !output.status.success() {
            return Err(ExecError::Fault(format!(
                "isolate --init failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let path_text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path_text.is_empty() {
            return Err(ExecError::Fault(
                "isolate --init did not return a box path".to_string(),
            ));
        }

        Ok(PathBuf::from(path_text))
    }

    async fn cleanup_box(&self, box_id: u32) -> Result<(), ExecError> {
        let output = Command::new(&self.bin)
            .arg(format!("--box-id={box_id}"))
            .arg("--cg")
            .arg("--cleanup")
            .output()
            .await
            .map_err(|err| {
                ExecError::Fault(format!("failed to execute isolate --cleanup: {err}"))
            })?;

        if !output.status.success() {
            return Err(ExecError::Fault(format!(
                "isolate --cleanup failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }

    async fn run_in_box(
        &self,
        box_id: u32,
        argv: &[String],
        run: &RunSpec,
    ) -> Result<IsolateVerdict, ExecError> {
        let meta_path = std::env::temp_dir().join(format!("codequest-isolate-{box_id}.meta"));

        let mut command = Command::new(&self.bin);
        command
            .arg(format!("--box-id={box_id}"))
            .arg("--cg")
            .arg(format!("--meta={}", meta_path.to_string_lossy()))
            .arg(format!("--wall-time={}", run.wall_time_secs))
            .arg("--env=PATH");

        if let Some(memory_kb) = run.memory_kb {
            command.arg(format!("--cg-mem={memory_kb}"));
        }
        // Compilers and the JVM fork helpers; submissions themselves are
        // limited by the cgroup rather than a process count.
        command.arg("--processes");

        if run.read_stdin {
            command.arg(format!("--stdin={STDIN_FILE}"));
        }
        command.arg(format!("--stdout={STDOUT_FILE}"));
        command.arg(format!("--stderr={STDERR_FILE}"));

        command.arg("--run").arg("--").args(argv);

        let output = command.output().await.map_err(|err| {
            ExecError::Fault(format!("failed to execute isolate --run: {err}"))
        })?;

        // isolate exits 1 when the sandboxed program failed; anything
        // beyond that is an infrastructure error.
        match output.status.code() {
            Some(0) | Some(1) => parse_meta_file(&meta_path).await,
            _ => Err(ExecError::Fault(format!(
                "isolate internal error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
        }
    }
}

#[async_trait]
impl Sandbox for IsolateSandbox {
    async fn execute(
        &self,
        language: Language,
        code: &str,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<ExecOutcome, ExecError> {
        let box_id = self.claim_box().await?;
        let result = self.execute_in_box(box_id, language, code, input, limits).await;
        self.release_box(box_id).await;
        result
    }
}

impl IsolateSandbox {
    async fn execute_in_box(
        &self,
        box_id: u32,
        language: Language,
        code: &str,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<ExecOutcome, ExecError> {
        let profile = LanguageProfile::for_language(language);
        let box_root = self.init_box(box_id).await?;
        let box_dir = box_root.join("box");

        tokio::fs::write(box_dir.join(profile.source_filename), code)
            .await
            .map_err(|err| ExecError::Fault(format!("failed to write source file: {err}")))?;
        tokio::fs::write(box_dir.join(STDIN_FILE), input)
            .await
            .map_err(|err| ExecError::Fault(format!("failed to write stdin file: {err}")))?;

        if let Some(argv) = profile.compile_argv() {
            let spec = RunSpec {
                wall_time_secs: COMPILE_WALL_TIME_SECS,
                memory_kb: None,
                read_stdin: false,
            };
            let verdict = self.run_in_box(box_id, &argv, &spec).await?;
            match verdict.status {
                MetaStatus::Ok => {}
                MetaStatus::Timeout => {
                    return Err(ExecError::Compile(format!(
                        "compilation exceeded {COMPILE_WALL_TIME_SECS}s"
                    )));
                }
                _ => {
                    let diagnostics = read_box_output(&box_dir).await;
                    return Err(ExecError::Compile(clip(
                        &format!("{}{}", diagnostics.stderr, diagnostics.stdout),
                        DIAGNOSTIC_LIMIT,
                    )));
                }
            }
        }

        let spec = RunSpec {
            wall_time_secs: limits.wall_time.as_secs_f64(),
            memory_kb: Some(limits.memory_bytes / 1024),
            read_stdin: true,
        };
        let verdict = self.run_in_box(box_id, &profile.run_argv(), &spec).await?;
        let captured = read_box_output(&box_dir).await;

        match verdict.status {
            MetaStatus::Ok => Ok(ExecOutcome {
                stdout: captured.stdout,
                stderr: captured.stderr,
                duration: verdict.wall_time,
            }),
            MetaStatus::Timeout => Err(ExecError::Timeout),
            MetaStatus::MemoryExceeded => Err(ExecError::MemoryExceeded),
            MetaStatus::Runtime => Err(ExecError::Runtime {
                detail: format!(
                    "{}: {}",
                    verdict.message,
                    clip(captured.stderr.trim(), DIAGNOSTIC_LIMIT)
                ),
                stdout: clip(&captured.stdout, DIAGNOSTIC_LIMIT),
            }),
            MetaStatus::Internal => Err(ExecError::Fault(verdict.message)),
        }
    }
}

struct RunSpec {
    wall_time_secs: f64,
    memory_kb: Option<u64>,
    read_stdin: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum MetaStatus {
    Ok,
    Timeout,
    MemoryExceeded,
    Runtime,
    Internal,
}

struct IsolateVerdict {
    status: MetaStatus,
    message: String,
    wall_time: Duration,
}

struct CapturedOutput {
    stdout: String,
    stderr: String,
}

async fn read_box_output(box_dir: &Path) -> CapturedOutput {
    let stdout = tokio::fs::read_to_string(box_dir.join(STDOUT_FILE)).await.unwrap_or_default();
    let stderr = tokio::fs::read_to_string(box_dir.join(STDERR_FILE)).await.unwrap_or_default();
    CapturedOutput { stdout, stderr }
}

async fn parse_meta_file(meta_path: &Path) -> Result<IsolateVerdict, ExecError> {
    let content = tokio::fs::read_to_string(meta_path).await.map_err(|err| {
        ExecError::Fault(format!("failed to read isolate meta file: {err}"))
    })?;
    Ok(parse_meta(&content))
}

fn parse_meta(content: &str) -> IsolateVerdict {
    let mut raw = HashMap::<&str, &str>::new();
    let mut oom_killed = false;

    for line in content.lines() {
        if let Some((key, value)) = line.split_once(':') {
            raw.insert(key.trim(), value.trim());
        } else if line.trim() == "cg-oom-killed" {
            oom_killed = true;
        }
    }

    // isolate writes the flag as `cg-oom-killed:1`.
    if let Some(value) = raw.get("cg-oom-killed") {
        oom_killed = oom_killed || *value != "0";
    }

    let wall_time = raw
        .get("time-wall")
        .and_then(|value| value.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
        .unwrap_or_default();

    let message = raw.get("message").map(|value| value.to_string()).unwrap_or_default();

    let status = if oom_killed {
        MetaStatus::MemoryExceeded
    } else {
        match raw.get("status").copied() {
            None => MetaStatus::Ok,
            Some("TO") => MetaStatus::Timeout,
            Some("RE") | Some("SG") => MetaStatus::Runtime,
            Some("XX") => MetaStatus::Internal,
            Some(_) => MetaStatus::Internal,
        }
    };

    IsolateVerdict { status, message, wall_time }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_without_status_is_ok() {
        let verdict = parse_meta("time:0.015\ntime-wall:0.021\nexitcode:0\n");
        assert_eq!(verdict.status, MetaStatus::Ok);
        assert_eq!(verdict.wall_time, Duration::from_secs_f64(0.021));
    }

    #[test]
    fn meta_timeout_status() {
        let verdict = parse_meta("status:TO\nmessage:Time limit exceeded\ntime-wall:5.002\n");
        assert_eq!(verdict.status, MetaStatus::Timeout);
        assert_eq!(verdict.message, "Time limit exceeded");
    }

    #[test]
    fn meta_oom_flag_wins_over_signal_status() {
        let verdict = parse_meta("status:SG\nexitsig:9\ncg-oom-killed\ntime-wall:0.2\n");
        assert_eq!(verdict.status, MetaStatus::MemoryExceeded);
    }

    #[test]
    fn meta_oom_flag_key_value_form() {
        let verdict = parse_meta("status:SG\nexitsig:9\ncg-oom-killed:1\ntime-wall:0.2\n");
        assert_eq!(verdict.status, MetaStatus::MemoryExceeded);
        let verdict = parse_meta("status:SG\nexitsig:11\ncg-oom-killed:0\n");
        assert_eq!(verdict.status, MetaStatus::Runtime);
    }

    #[test]
    fn meta_runtime_and_internal_statuses() {
        assert_eq!(parse_meta("status:RE\nexitcode:1\n").status, MetaStatus::Runtime);
        assert_eq!(parse_meta("status:SG\nexitsig:11\n").status, MetaStatus::Runtime);
        assert_eq!(parse_meta("status:XX\nmessage:box error\n").status, MetaStatus::Internal);
    }
}
