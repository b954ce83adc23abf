use sqlx::postgres::PgPoolOptions;

// Runs only when DATABASE_URL points at a disposable database.
#[tokio::test]
async fn migrations_apply_cleanly() {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping: DATABASE_URL is not set");
        return;
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("connect");

    sqlx::migrate!("./migrations").run(&pool).await.expect("migrations");

    for table in ["assignments", "test_cases", "submissions"] {
        let exists: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name = $1",
        )
        .bind(table)
        .fetch_optional(&pool)
        .await
        .expect("table lookup");
        assert!(exists.is_some(), "table {table} missing");
    }
}
