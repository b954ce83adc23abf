use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::grading::GradingService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    grader: Arc<GradingService>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, grader: Arc<GradingService>) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, grader }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn grader(&self) -> &GradingService {
        &self.inner.grader
    }
}
