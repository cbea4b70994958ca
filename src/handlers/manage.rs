// src/handlers/manage.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{AttemptSearchParams, AttemptView},
        test::{CreateTestRequest, SetPublishedRequest, Test, TestSummary, UpdateTestRequest},
    },
    services::with_deadline,
    state::AppState,
    utils::jwt::Claims,
};

/// Loads a test the caller may manage: its creator, or any admin.
async fn managed_test(state: &AppState, claims: &Claims, id: i64) -> Result<Test, AppError> {
    let test = with_deadline(
        state.config.operation_timeout,
        state.tests.get_test_with_questions(id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Test {} not found", id)))?;

    if claims.is_admin() || test.created_by == Some(claims.user_id()?) {
        Ok(test)
    } else {
        Err(AppError::Forbidden(
            "Only the test's creator or an admin can manage it".to_string(),
        ))
    }
}

/// Creates a complete test (questions and options) from an upload.
/// Staff only. The test starts unpublished.
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let new_test = payload.into_new_test(user_id);
    let test = with_deadline(state.config.operation_timeout, state.tests.create_test(new_test)).await?;

    tracing::info!(
        test_id = test.id,
        user_id,
        questions = test.questions.len(),
        "Test created"
    );
    Ok((StatusCode::CREATED, Json(test)))
}

/// Lists tests created by the caller, published or not.
pub async fn list_my_tests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let tests = with_deadline(
        state.config.operation_timeout,
        state.tests.list_by_creator(user_id),
    )
    .await?;
    let summaries: Vec<TestSummary> = tests.iter().map(TestSummary::from).collect();
    Ok(Json(summaries))
}

/// Full test including correct options.
pub async fn get_managed_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(managed_test(&state, &claims, id).await?))
}

/// Replaces a test's metadata (title, description, standard, difficulty,
/// time limit, passing score). Pass/fail of past attempts follows the new
/// passing score, since it is derived on read.
pub async fn update_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    managed_test(&state, &claims, id).await?;

    let test = with_deadline(
        state.config.operation_timeout,
        state.tests.update_test(id, &payload),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Test {} not found", id)))?;

    tracing::info!(
        test_id = id,
        user_id = %claims.sub,
        passing_score = test.passing_score,
        "Test updated"
    );
    Ok(Json(test))
}

pub async fn set_published(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SetPublishedRequest>,
) -> Result<impl IntoResponse, AppError> {
    managed_test(&state, &claims, id).await?;

    let updated = with_deadline(
        state.config.operation_timeout,
        state.tests.set_published(id, payload.published),
    )
    .await?;
    if !updated {
        return Err(AppError::NotFound(format!("Test {} not found", id)));
    }

    tracing::info!(test_id = id, published = payload.published, "Test visibility changed");
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a test together with its questions, attempts and answers.
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    managed_test(&state, &claims, id).await?;

    let deleted = with_deadline(state.config.operation_timeout, state.tests.delete_test(id)).await?;
    if !deleted {
        return Err(AppError::NotFound(format!("Test {} not found", id)));
    }

    tracing::warn!(test_id = id, user_id = %claims.sub, "Test deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Filtered attempt search across all users. Staff only.
pub async fn search_attempts(
    State(state): State<AppState>,
    Query(params): Query<AttemptSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    if let (Some(min), Some(max)) = (params.score_min, params.score_max) {
        if min > max {
            return Err(AppError::BadRequest(
                "score_min must not exceed score_max".to_string(),
            ));
        }
    }

    let rows = with_deadline(
        state.config.operation_timeout,
        state.attempts.search_attempts(&params),
    )
    .await?;
    let views: Vec<AttemptView> = rows.into_iter().map(AttemptView::from).collect();
    Ok(Json(views))
}
