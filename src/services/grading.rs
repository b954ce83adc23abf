//! Submission grading: runs every test case through the sandbox,
//! compares outputs and aggregates a 0-100 grade.
//!
//! Cases run with bounded parallelism under a whole-submission time
//! budget. One result is produced per fetched case, in fetch order,
//! and a failing case never prevents the remaining cases from being
//! graded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::core::config::Settings;
use crate::db::models::{TestCase, TestFailure, TestResult};
use crate::db::types::{ExecErrorKind, Language};
use crate::sandbox::{clip, ExecError, ResourceLimits, Sandbox};
use crate::services::comparator;

const STORED_OUTPUT_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct GradingOutcome {
    pub(crate) results: Vec<TestResult>,
    pub(crate) passed_tests: i32,
    pub(crate) total_tests: i32,
    pub(crate) auto_grade: i32,
}

pub(crate) struct GradingService {
    sandbox: Arc<dyn Sandbox>,
    limits: ResourceLimits,
    concurrency: usize,
    submission_budget: Duration,
    fault_attempts: u32,
    fault_backoff: Duration,
}

impl GradingService {
    pub(crate) fn from_settings(settings: &Settings, sandbox: Arc<dyn Sandbox>) -> Self {
        let grader = settings.grader();
        Self {
            sandbox,
            limits: ResourceLimits {
                wall_time: grader.case_timeout(),
                memory_bytes: grader.memory_limit_bytes(),
            },
            concurrency: grader.concurrency,
            submission_budget: grader.submission_budget(),
            fault_attempts: grader.sandbox_fault_attempts,
            fault_backoff: grader.fault_backoff(),
        }
    }

    #[cfg(test)]
    fn for_tests(
        sandbox: Arc<dyn Sandbox>,
        concurrency: usize,
        submission_budget: Duration,
        fault_attempts: u32,
    ) -> Self {
        Self {
            sandbox,
            limits: ResourceLimits {
                wall_time: Duration::from_secs(5),
                memory_bytes: 256 * 1024 * 1024,
            },
            concurrency,
            submission_budget,
            fault_attempts,
            fault_backoff: Duration::from_millis(10),
        }
    }

    /// Grade `code` against `cases`. Never fails as a whole: sandbox
    /// problems surface as per-case errors inside the outcome.
    pub(crate) async fn grade(
        &self,
        submission_id: &str,
        language: Language,
        code: &str,
        cases: &[TestCase],
    ) -> GradingOutcome {
        let started = Instant::now();
        let results = self.run_cases(language, code, cases).await;
        let outcome = summarize(results, cases);

        metrics::counter!("grading_submissions_total").increment(1);
        metrics::histogram!("grading_submission_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            submission_id,
            language = language.as_str(),
            passed = outcome.passed_tests,
            total = outcome.total_tests,
            auto_grade = outcome.auto_grade,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission graded"
        );

        outcome
    }

    async fn run_cases(
        &self,
        language: Language,
        code: &str,
        cases: &[TestCase],
    ) -> Vec<TestResult> {
        let deadline = Instant::now() + self.submission_budget;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let code: Arc<str> = Arc::from(code);

        let mut handles = Vec::with_capacity(cases.len());
        for case in cases {
            let sandbox = Arc::clone(&self.sandbox);
            let semaphore = Arc::clone(&semaphore);
            let code = Arc::clone(&code);
            let case = case.clone();
            let limits = self.limits;
            let fault_attempts = self.fault_attempts;
            let fault_backoff = self.fault_backoff;

            handles.push(tokio::spawn(async move {
                // A case that cannot start before the submission
                // budget runs out is reported as timed out.
                let permit =
                    match tokio::time::timeout_at(deadline, semaphore.acquire_owned()).await {
                        Ok(Ok(permit)) => permit,
                        _ => return budget_exhausted_result(&case),
                    };

                let result = execute_case(
                    sandbox.as_ref(),
                    language,
                    &code,
                    &case,
                    limits,
                    fault_attempts,
                    fault_backoff,
                )
                .await;
                drop(permit);
                result
            }));
        }

        let mut results = Vec::with_capacity(cases.len());
        for (handle, case) in handles.into_iter().zip(cases) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(err) => {
                    tracing::error!(test_case_id = %case.id, error = %err, "Grading task panicked");
                    results.push(error_result(
                        case,
                        0,
                        ExecErrorKind::SandboxFault,
                        "grading task panicked".to_string(),
                        String::new(),
                    ));
                }
            }
        }
        results
    }
}

async fn execute_case(
    sandbox: &dyn Sandbox,
    language: Language,
    code: &str,
    case: &TestCase,
    limits: ResourceLimits,
    fault_attempts: u32,
    fault_backoff: Duration,
) -> TestResult {
    let started = Instant::now();
    let mut attempt = 1u32;
    let execution = loop {
        match sandbox.execute(language, code, &case.input, limits).await {
            Err(ExecError::Fault(detail)) if attempt < fault_attempts => {
                tracing::warn!(
                    test_case_id = %case.id,
                    attempt,
                    detail,
                    "Sandbox fault, retrying"
                );
                attempt += 1;
                tokio::time::sleep(fault_backoff).await;
            }
            other => break other,
        }
    };

    match execution {
        Ok(outcome) => {
            let passed = comparator::outputs_match(&outcome.stdout, &case.expected_output);
            metrics::counter!("grading_cases_total", "verdict" => if passed { "passed" } else { "failed" })
                .increment(1);
            TestResult {
                test_case_id: case.id.clone(),
                actual_output: clip(&outcome.stdout, STORED_OUTPUT_LIMIT),
                stderr: clip(&outcome.stderr, STORED_OUTPUT_LIMIT),
                passed,
                points_awarded: if passed { case.points } else { 0 },
                duration_ms: outcome.duration.as_millis() as i64,
                error: None,
                is_hidden: case.is_hidden,
            }
        }
        Err(err) => {
            let kind = err.kind();
            metrics::counter!("grading_cases_total", "verdict" => kind.as_str()).increment(1);
            let stdout = match &err {
                ExecError::Runtime { stdout, .. } => stdout.clone(),
                _ => String::new(),
            };
            error_result(
                case,
                started.elapsed().as_millis() as i64,
                kind,
                err.to_string(),
                stdout,
            )
        }
    }
}

fn budget_exhausted_result(case: &TestCase) -> TestResult {
    metrics::counter!("grading_cases_total", "verdict" => ExecErrorKind::Timeout.as_str())
        .increment(1);
    error_result(
        case,
        0,
        ExecErrorKind::Timeout,
        "submission time budget exhausted before this case could run".to_string(),
        String::new(),
    )
}

fn error_result(
    case: &TestCase,
    duration_ms: i64,
    kind: ExecErrorKind,
    detail: String,
    stdout: String,
) -> TestResult {
    TestResult {
        test_case_id: case.id.clone(),
        actual_output: clip(&stdout, STORED_OUTPUT_LIMIT),
        stderr: String::new(),
        passed: false,
        points_awarded: 0,
        duration_ms,
        error: Some(TestFailure { kind, detail }),
        is_hidden: case.is_hidden,
    }
}

/// Weighted aggregate over the per-case results. The grade is the
/// awarded share of total points scaled to 0-100 and rounded half up.
fn summarize(results: Vec<TestResult>, cases: &[TestCase]) -> GradingOutcome {
    let passed_tests = results.iter().filter(|result| result.passed).count() as i32;
    let total_tests = results.len() as i32;

    let total_points: i64 = cases.iter().map(|case| i64::from(case.points)).sum();
    let awarded_points: i64 = results.iter().map(|result| i64::from(result.points_awarded)).sum();

    let auto_grade = if total_points == 0 {
        0
    } else {
        (100.0 * awarded_points as f64 / total_points as f64).round() as i32
    };

    GradingOutcome { results, passed_tests, total_tests, auto_grade }
}
