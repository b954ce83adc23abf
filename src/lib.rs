pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod sandbox;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{config::Settings, observability, state::AppState};
use crate::services::grading::GradingService;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    observability::init_tracing(&settings)?;
    observability::init_metrics(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let sandbox = sandbox::from_settings(&settings);
    let grader = Arc::new(GradingService::from_settings(&settings, sandbox));
    let state = AppState::new(settings, db_pool, grader);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        backend = %state.settings().grader().backend.as_str(),
        "CodeQuest Grader API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(observability::shutdown_signal())
        .await?;

    Ok(())
}
