use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{ExecErrorKind, Language, SubmissionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct TestCase {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) input: String,
    pub(crate) expected_output: String,
    pub(crate) is_hidden: bool,
    pub(crate) points: i32,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Submission {
    pub(crate) id: String,
    pub(crate) assignment_id: String,
    pub(crate) user_id: String,
    pub(crate) code: String,
    pub(crate) language: Language,
    pub(crate) status: SubmissionStatus,
    pub(crate) test_results: Option<Json<Vec<TestResult>>>,
    pub(crate) passed_tests: Option<i32>,
    pub(crate) total_tests: Option<i32>,
    pub(crate) auto_grade: Option<i32>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// One graded test case. Persisted as an element of the submission's
/// `test_results` JSONB array, in test-case fetch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TestResult {
    pub(crate) test_case_id: String,
    pub(crate) actual_output: String,
    /// Captured standard error, diagnostic only; never part of
    /// pass/fail.
    #[serde(default)]
    pub(crate) stderr: String,
    pub(crate) passed: bool,
    pub(crate) points_awarded: i32,
    pub(crate) duration_ms: i64,
    pub(crate) error: Option<TestFailure>,
    pub(crate) is_hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TestFailure {
    pub(crate) kind: ExecErrorKind,
    pub(crate) detail: String,
}
