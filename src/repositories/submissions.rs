use sqlx::types::Json;
use sqlx::PgPool;

use crate::db::models::{Submission, TestResult};

const COLUMNS: &str = "id, assignment_id, user_id, code, language, status, test_results, \
     passed_tests, total_tests, auto_grade, graded_at, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> sqlx::Result<Option<Submission>> {
    let query = format!("SELECT {COLUMNS} FROM submissions WHERE id = $1");
    sqlx::query_as::<_, Submission>(&query).bind(id).fetch_optional(pool).await
}

/// Persist a grading outcome atomically. Concurrent grades of the
/// same submission are serialized on an advisory lock, and the last
/// writer wins, so retried requests converge on one stored result.
/// Returns false when the submission no longer exists.
pub(crate) async fn write_grading_result(
    pool: &PgPool,
    id: &str,
    results: &[TestResult],
    passed_tests: i32,
    total_tests: i32,
    auto_grade: i32,
) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let updated = sqlx::query(
        "UPDATE submissions \
         SET status = 'graded', test_results = $2, passed_tests = $3, total_tests = $4, \
             auto_grade = $5, graded_at = now(), updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(Json(results))
    .bind(passed_tests)
    .bind(total_tests)
    .bind(auto_grade)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated.rows_affected() > 0)
}

/// Best-effort marker for submissions whose grading outcome could not
/// be stored.
pub(crate) async fn mark_failed(pool: &PgPool, id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE submissions SET status = 'failed', updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
