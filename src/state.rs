// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    repositories::{
        AttemptRepository, MemoryStore, PgAttemptRepository, PgStatsRepository, PgTestRepository,
        TestRepository,
    },
    services::{AttemptService, StatsService},
};

#[derive(Clone)]
pub struct AppState {
    pub tests: Arc<dyn TestRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub attempt_service: AttemptService,
    pub stats_service: StatsService,
    pub config: Config,
}

impl AppState {
    /// Wires every store to Postgres through the shared pool.
    pub fn with_postgres(pool: PgPool, config: Config) -> Self {
        let tests = Arc::new(PgTestRepository::new(pool.clone()));
        let attempts = Arc::new(PgAttemptRepository::new(pool.clone()));
        let stats = Arc::new(PgStatsRepository::new(pool));

        let stats_service = StatsService::new(stats, attempts.clone(), config.operation_timeout);
        let attempt_service = AttemptService::new(
            tests.clone(),
            attempts.clone(),
            attempts.clone(),
            stats_service.clone(),
            config.operation_timeout,
        );

        Self {
            tests,
            attempts,
            attempt_service,
            stats_service,
            config,
        }
    }

    /// Wires every store to one in-process `MemoryStore`.
    pub fn with_memory(store: MemoryStore, config: Config) -> Self {
        let store = Arc::new(store);

        let stats_service =
            StatsService::new(store.clone(), store.clone(), config.operation_timeout);
        let attempt_service = AttemptService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            stats_service.clone(),
            config.operation_timeout,
        );

        Self {
            tests: store.clone(),
            attempts: store,
            attempt_service,
            stats_service,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AttemptService {
    fn from_ref(state: &AppState) -> Self {
        state.attempt_service.clone()
    }
}

impl FromRef<AppState> for StatsService {
    fn from_ref(state: &AppState) -> Self {
        state.stats_service.clone()
    }
}
