// src/handlers/dashboard.rs

use axum::{
    Json,
    extract::{Extension, State},
    response::IntoResponse,
};

use crate::{error::AppError, services::StatsService, utils::jwt::Claims};

/// Stats, streak, trend and recent attempts of the calling user.
pub async fn get_dashboard(
    State(stats): State<StatsService>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(stats.dashboard(user_id).await?))
}
