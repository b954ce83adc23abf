use std::sync::{Arc, OnceLock};

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request};
use axum::Router;
use sqlx::PgPool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::db::types::Language;
use crate::sandbox;
use crate::services::grading::GradingService;

/// Serializes tests that mutate process environment variables.
pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    dotenvy::dotenv().ok();

    // DATABASE_URL is deliberately left untouched: lazy-pool tests
    // never connect, and the database-gated tests skip without it.
    std::env::set_var("CODEQUEST_ENV", "test");
    std::env::set_var("CODEQUEST_STRICT_CONFIG", "0");
    std::env::set_var("GRADER_BACKEND", "process");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// State backed by a lazy pool; requests that never reach the
/// database work without one.
pub(crate) fn build_state() -> AppState {
    let settings = Settings::load().expect("settings");
    let db = sqlx::PgPool::connect_lazy(&settings.database().database_url()).expect("lazy pool");
    let sandbox = sandbox::from_settings(&settings);
    let grader = Arc::new(GradingService::from_settings(&settings, sandbox));
    AppState::new(settings, db, grader)
}

pub(crate) struct DbTestContext {
    pub(crate) app: Router,
    pub(crate) db: PgPool,
    _guard: OwnedMutexGuard<()>,
}

/// Full gateway context against a real database. Returns `None` (so
/// callers skip) when `DATABASE_URL` is not set; the database it names
/// is treated as disposable.
pub(crate) async fn setup_db_context() -> Option<DbTestContext> {
    let guard = env_lock().await;

    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skipping: DATABASE_URL is not set");
        return None;
    }

    set_test_env();

    let settings = Settings::load().expect("settings");
    let db = crate::db::init_pool(&settings).await.expect("db pool");
    crate::db::run_migrations(&db).await.expect("migrations");
    sqlx::query("TRUNCATE submissions, test_cases, assignments")
        .execute(&db)
        .await
        .expect("truncate tables");

    let sandbox = sandbox::from_settings(&settings);
    let grader = Arc::new(GradingService::from_settings(&settings, sandbox));
    let state = AppState::new(settings, db.clone(), grader);
    let app = api::router::router(state);

    Some(DbTestContext { app, db, _guard: guard })
}

pub(crate) async fn insert_assignment(pool: &PgPool, id: &str, language: Language) {
    sqlx::query("INSERT INTO assignments (id, title, language) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(format!("Assignment {id}"))
        .bind(language)
        .execute(pool)
        .await
        .expect("insert assignment");
}

pub(crate) async fn insert_test_case(
    pool: &PgPool,
    id: &str,
    assignment_id: &str,
    input: &str,
    expected_output: &str,
    points: i32,
) {
    sqlx::query(
        "INSERT INTO test_cases (id, assignment_id, input, expected_output, points) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(assignment_id)
    .bind(input)
    .bind(expected_output)
    .bind(points)
    .execute(pool)
    .await
    .expect("insert test case");
}

pub(crate) async fn insert_submission(
    pool: &PgPool,
    id: &str,
    assignment_id: &str,
    code: &str,
    language: Language,
) {
    sqlx::query(
        "INSERT INTO submissions (id, assignment_id, user_id, code, language) \
         VALUES ($1, $2, 'user-1', $3, $4)",
    )
    .bind(id)
    .bind(assignment_id)
    .bind(code)
    .bind(language)
    .execute(pool)
    .await
    .expect("insert submission");
}

pub(crate) fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub(crate) fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    let bytes = serde_json::to_vec(&body).expect("serialize body");
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("request body")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
