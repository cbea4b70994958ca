// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    services::{AttemptService, StatsService},
};

/// Marks an in-progress attempt as abandoned.
/// Admin only.
pub async fn abandon_attempt(
    State(service): State<AttemptService>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.abandon(attempt_id).await?))
}

/// Recomputes a user's stats from their completed attempts.
/// Admin only.
pub async fn rebuild_stats(
    State(stats): State<StatsService>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(stats.rebuild(user_id).await?))
}
