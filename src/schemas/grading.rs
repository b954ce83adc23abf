use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{TestFailure, TestResult};
use crate::db::types::Language;
use crate::services::grading::GradingOutcome;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradeRequest {
    #[validate(length(min = 1, message = "submissionId must not be empty"))]
    pub(crate) submission_id: String,
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub(crate) code: String,
    #[validate(length(min = 1, message = "assignmentId must not be empty"))]
    pub(crate) assignment_id: String,
    pub(crate) language: Language,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GradeResponse {
    pub(crate) success: bool,
    pub(crate) test_results: Vec<TestResultResponse>,
    pub(crate) passed_tests: i32,
    pub(crate) total_tests: i32,
    pub(crate) auto_grade: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestResultResponse {
    pub(crate) test_case_id: String,
    pub(crate) actual_output: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) stderr: String,
    pub(crate) passed: bool,
    pub(crate) points_awarded: i32,
    pub(crate) duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<TestFailure>,
    pub(crate) is_hidden: bool,
}

impl From<TestResult> for TestResultResponse {
    fn from(result: TestResult) -> Self {
        Self {
            test_case_id: result.test_case_id,
            actual_output: result.actual_output,
            stderr: result.stderr,
            passed: result.passed,
            points_awarded: result.points_awarded,
            duration_ms: result.duration_ms,
            error: result.error,
            is_hidden: result.is_hidden,
        }
    }
}

impl From<GradingOutcome> for GradeResponse {
    fn from(outcome: GradingOutcome) -> Self {
        Self {
            success: true,
            test_results: outcome.results.into_iter().map(TestResultResponse::from).collect(),
            passed_tests: outcome.passed_tests,
            total_tests: outcome.total_tests,
            auto_grade: outcome.auto_grade,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_keys() {
        let request: GradeRequest = serde_json::from_value(serde_json::json!({
            "submissionId": "sub-1",
            "code": "print(42)",
            "assignmentId": "asg-1",
            "language": "python",
        }))
        .unwrap();
        assert_eq!(request.submission_id, "sub-1");
        assert_eq!(request.language, Language::Python);
    }

    #[test]
    fn unknown_language_is_rejected() {
        let result = serde_json::from_value::<GradeRequest>(serde_json::json!({
            "submissionId": "sub-1",
            "code": "x",
            "assignmentId": "asg-1",
            "language": "rust",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn empty_fields_fail_validation() {
        let request: GradeRequest = serde_json::from_value(serde_json::json!({
            "submissionId": "",
            "code": "x",
            "assignmentId": "asg-1",
            "language": "c",
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = GradeResponse {
            success: true,
            test_results: vec![],
            passed_tests: 2,
            total_tests: 3,
            auto_grade: 75,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["passedTests"], 2);
        assert_eq!(value["totalTests"], 3);
        assert_eq!(value["autoGrade"], 75);
        assert_eq!(value["success"], true);
    }
}
