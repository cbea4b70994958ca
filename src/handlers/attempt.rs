// src/handlers/attempt.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::{
        attempt::{
            AnswerFeedback, AttemptProgressResponse, SavedSelection, SubmissionResponse,
            SubmitAnswerRequest, TestAttempt,
        },
        test::PublicTest,
    },
    services::AttemptService,
    utils::jwt::Claims,
};

/// Rejects callers who do not own the attempt. Staff pass when `allow_staff` is set.
fn ensure_owner(attempt: &TestAttempt, claims: &Claims, allow_staff: bool) -> Result<(), AppError> {
    if attempt.user_id == claims.user_id()? || (allow_staff && claims.is_staff()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have access to this attempt".to_string(),
        ))
    }
}

/// Starts a new attempt on a test for the calling user.
pub async fn start_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let attempt = service.start(user_id, test_id, claims.is_staff()).await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}

/// Returns the attempt, the test as the student sees it, and saved selections.
pub async fn get_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.snapshot(attempt_id).await?;
    ensure_owner(&snapshot.attempt, &claims, false)?;

    Ok(Json(AttemptProgressResponse {
        test: PublicTest::from(&snapshot.test),
        answers: snapshot.answers.iter().map(SavedSelection::from).collect(),
        attempt: snapshot.attempt,
    }))
}

/// Saves one answer. Re-submitting for the same question replaces the earlier choice.
pub async fn submit_answer(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = service.get_attempt(attempt_id).await?;
    ensure_owner(&attempt, &claims, false)?;

    let answer = service
        .submit_answer(attempt_id, payload.question_id, payload.option_id)
        .await?;

    let is_correct = answer.is_correct.unwrap_or(false);
    Ok(Json(AnswerFeedback {
        question_id: answer.question_id,
        is_correct,
        answered_at: answer.answered_at,
        message: if is_correct { "Correct" } else { "Incorrect" },
    }))
}

/// Completes the attempt and returns the final score.
pub async fn submit_attempt(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = service.get_attempt(attempt_id).await?;
    ensure_owner(&attempt, &claims, false)?;

    let completed = service.complete(attempt_id).await?;

    Ok(Json(SubmissionResponse {
        attempt_id: completed.attempt.id,
        score: completed.attempt.score.unwrap_or_default(),
        total_points: completed.attempt.total_points.unwrap_or_default(),
        percentage: completed.percentage,
        passed: completed.passed,
        time_taken_seconds: completed.attempt.time_taken_seconds,
        stats_updated: completed.stats_updated,
    }))
}

/// Per-question review of a completed attempt. Owner or staff.
pub async fn get_results(
    State(service): State<AttemptService>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = service.get_attempt(attempt_id).await?;
    ensure_owner(&attempt, &claims, true)?;

    Ok(Json(service.results(attempt_id).await?))
}
