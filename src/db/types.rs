use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Languages the sandbox can execute. The database enum and the wire
/// format share the lowercase spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "language", rename_all = "lowercase")]
pub(crate) enum Language {
    Python,
    Javascript,
    Java,
    C,
    Cpp,
}

impl Language {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submissionstatus", rename_all = "lowercase")]
pub(crate) enum SubmissionStatus {
    Pending,
    Graded,
    Failed,
}

/// Per-test-case failure category, stored inside the `test_results`
/// JSONB array and echoed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ExecErrorKind {
    CompileError,
    RuntimeError,
    Timeout,
    MemoryExceeded,
    SandboxFault,
}

impl ExecErrorKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ExecErrorKind::CompileError => "compile_error",
            ExecErrorKind::RuntimeError => "runtime_error",
            ExecErrorKind::Timeout => "timeout",
            ExecErrorKind::MemoryExceeded => "memory_exceeded",
            ExecErrorKind::SandboxFault => "sandbox_fault",
        }
    }
}
