use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::extractors::AppJson;
use crate::api::validation;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::grading::{GradeRequest, GradeResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/grade", post(grade))
}

/// Grade one submission: fetch the assignment's test cases, run the
/// submitted code against each of them and persist the outcome onto
/// the submission row.
pub(crate) async fn grade(
    State(state): State<AppState>,
    AppJson(payload): AppJson<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    validation::validate_payload(&payload)?;

    let submission = repositories::submissions::find_by_id(state.db(), &payload.submission_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load submission"))?;
    if submission.is_none() {
        return Err(ApiError::NotFound(format!(
            "Submission {} not found",
            payload.submission_id
        )));
    }

    let cases = repositories::test_cases::list_by_assignment(state.db(), &payload.assignment_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load test cases"))?;
    if cases.is_empty() {
        return Err(ApiError::NotFound(format!(
            "Assignment {} has no test cases",
            payload.assignment_id
        )));
    }

    let outcome = state
        .grader()
        .grade(&payload.submission_id, payload.language, &payload.code, &cases)
        .await;

    match repositories::submissions::write_grading_result(
        state.db(),
        &payload.submission_id,
        &outcome.results,
        outcome.passed_tests,
        outcome.total_tests,
        outcome.auto_grade,
    )
    .await
    {
        Ok(true) => {}
        Ok(false) => {
            // Deleted between the existence check and the write.
            return Err(ApiError::NotFound(format!(
                "Submission {} not found",
                payload.submission_id
            )));
        }
        Err(err) => {
            if let Err(mark_err) =
                repositories::submissions::mark_failed(state.db(), &payload.submission_id).await
            {
                tracing::error!(error = %mark_err, "Failed to mark submission as failed");
            }
            return Err(ApiError::internal(err, "Failed to store grading result"));
        }
    }

    Ok(Json(GradeResponse::from(outcome)))
}
