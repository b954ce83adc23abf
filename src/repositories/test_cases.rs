use sqlx::PgPool;

use crate::db::models::TestCase;

const COLUMNS: &str =
    "id, assignment_id, input, expected_output, is_hidden, points, description, created_at";

/// Test cases for one assignment in their stable grading order:
/// authoring order first, id as the tie-breaker.
pub(crate) async fn list_by_assignment(
    pool: &PgPool,
    assignment_id: &str,
) -> sqlx::Result<Vec<TestCase>> {
    let query = format!(
        "SELECT {COLUMNS} FROM test_cases WHERE assignment_id = $1 ORDER BY created_at, id"
    );
    sqlx::query_as::<_, TestCase>(&query).bind(assignment_id).fetch_all(pool).await
}
