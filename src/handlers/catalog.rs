// src/handlers/catalog.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::test::{PublicTest, TestSummary},
    services::with_deadline,
    state::AppState,
};

/// Lists published tests, newest first.
pub async fn list_tests(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let tests = with_deadline(state.config.operation_timeout, state.tests.list_published()).await?;
    let summaries: Vec<TestSummary> = tests.iter().map(TestSummary::from).collect();
    Ok(Json(summaries))
}

/// Returns a published test ready to be taken. Correct flags are stripped.
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let test = with_deadline(
        state.config.operation_timeout,
        state.tests.get_test_with_questions(id),
    )
    .await?
    .filter(|t| t.published)
    .ok_or_else(|| AppError::NotFound(format!("Test {} not found", id)))?;

    Ok(Json(PublicTest::from(&test)))
}
