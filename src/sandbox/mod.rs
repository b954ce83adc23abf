pub(crate) mod isolate;
pub(crate) mod languages;
pub(crate) mod process;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::{SandboxBackend, Settings};
use crate::db::types::{ExecErrorKind, Language};

/// Limits applied to a single execution.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceLimits {
    pub(crate) wall_time: Duration,
    pub(crate) memory_bytes: u64,
}

/// Captured output of one successful execution. Timing is diagnostic
/// only and never feeds into pass/fail.
#[derive(Debug, Clone)]
pub(crate) struct ExecOutcome {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) duration: Duration,
}

#[derive(Debug, Error)]
pub(crate) enum ExecError {
    #[error("compilation failed: {0}")]
    Compile(String),
    #[error("runtime error: {detail}")]
    Runtime { detail: String, stdout: String },
    #[error("wall-clock limit exceeded")]
    Timeout,
    #[error("memory limit exceeded")]
    MemoryExceeded,
    #[error("sandbox fault: {0}")]
    Fault(String),
}

impl ExecError {
    pub(crate) fn kind(&self) -> ExecErrorKind {
        match self {
            ExecError::Compile(_) => ExecErrorKind::CompileError,
            ExecError::Runtime { .. } => ExecErrorKind::RuntimeError,
            ExecError::Timeout => ExecErrorKind::Timeout,
            ExecError::MemoryExceeded => ExecErrorKind::MemoryExceeded,
            ExecError::Fault(_) => ExecErrorKind::SandboxFault,
        }
    }
}

/// One isolated execution of untrusted code against a single stdin
/// payload. Implementations must provision a fresh environment per
/// call and force-kill anything still running at the wall-clock limit.
#[async_trait]
pub(crate) trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        language: Language,
        code: &str,
        input: &str,
        limits: ResourceLimits,
    ) -> Result<ExecOutcome, ExecError>;
}

pub(crate) fn from_settings(settings: &Settings) -> Arc<dyn Sandbox> {
    let grader = settings.grader();
    match grader.backend {
        SandboxBackend::Process => Arc::new(process::ProcessSandbox::new()),
        SandboxBackend::Isolate => {
            Arc::new(isolate::IsolateSandbox::new(grader.isolate_bin.clone(), grader.isolate_boxes))
        }
    }
}

/// Clip diagnostic text so oversized compiler or program output cannot
/// bloat stored results.
pub(crate) fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_short_text_untouched() {
        assert_eq!(clip("abc", 10), "abc");
    }

    #[test]
    fn clip_truncates_on_char_boundary() {
        let clipped = clip("héllo wörld", 3);
        assert!(clipped.starts_with("hé") || clipped.starts_with("h"));
        assert!(clipped.ends_with("[truncated]"));
    }

    #[test]
    fn exec_error_kinds() {
        assert_eq!(ExecError::Compile(String::new()).kind(), ExecErrorKind::CompileError);
        assert_eq!(
            ExecError::Runtime { detail: String::new(), stdout: String::new() }.kind(),
            ExecErrorKind::RuntimeError
        );
        assert_eq!(ExecError::Timeout.kind(), ExecErrorKind::Timeout);
        assert_eq!(ExecError::MemoryExceeded.kind(), ExecErrorKind::MemoryExceeded);
        assert_eq!(ExecError::Fault(String::new()).kind(), ExecErrorKind::SandboxFault);
    }
}
