// tests/pg_repository_tests.rs

//! Exercises the Postgres repositories against a real database.
//!
//! Needs `DATABASE_URL`; each test returns early when it is unset so the
//! suite still runs on machines without Postgres.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use exam_platform::{
    error::CoreError,
    models::{
        attempt::{AttemptSearchParams, AttemptStatus, CompletionRecord},
        test::{NewOption, NewQuestion, NewTest, Test, UpdateTestRequest},
    },
    repositories::{
        AnswerRepository, AttemptRepository, PgAttemptRepository, PgStatsRepository,
        PgTestRepository, StatsRepository, TestRepository,
    },
    services::{AttemptService, StatsService},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

/// Connects and migrates, or returns `None` when no database is configured.
async fn pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping Postgres repository test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

/// A user id no earlier run has touched, so rollups start empty.
fn fresh_user_id() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    (nanos % 1_000_000_000_000) as i64 + 1_000_000
}

fn new_test(weights: &[i32], passing_score: i32) -> NewTest {
    NewTest {
        title: "Postgres fixture".to_string(),
        description: "Repository test".to_string(),
        exam_standard: "GCSE".to_string(),
        difficulty: "Medium".to_string(),
        time_limit_minutes: 20,
        passing_score,
        published: true,
        created_by: Some(1),
        questions: weights
            .iter()
            .enumerate()
            .map(|(i, &points)| NewQuestion {
                question_text: format!("Question {}", i + 1),
                image_url: None,
                points,
                options: (0..4)
                    .map(|j| NewOption {
                        option_text: format!("Option {}", j + 1),
                        is_correct: j == 0,
                    })
                    .collect(),
            })
            .collect(),
    }
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn record(score: i32, total_points: i32, completed_at: DateTime<Utc>) -> CompletionRecord {
    CompletionRecord {
        score,
        total_points,
        time_taken_seconds: 60,
        completed_at,
    }
}

/// Starts and completes one attempt with a fixed score and completion time.
async fn completed(
    attempts: &PgAttemptRepository,
    user_id: i64,
    test: &Test,
    score: i32,
    completed_at: DateTime<Utc>,
) {
    let attempt = attempts
        .create_attempt(user_id, test.id, completed_at - chrono::Duration::minutes(5))
        .await
        .unwrap();
    attempts
        .complete_attempt(attempt.id, &record(score, test.total_points(), completed_at))
        .await
        .unwrap();
}

#[tokio::test]
async fn rubric_round_trips_with_ordered_options() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool);

    let created = tests.create_test(new_test(&[1, 3], 60)).await.unwrap();
    let loaded = tests
        .get_test_with_questions(created.id)
        .await
        .unwrap()
        .expect("test should exist");

    assert_eq!(loaded.questions.len(), 2);
    assert_eq!(loaded.total_points(), 4);
    for question in &loaded.questions {
        let orders: Vec<i32> = question.options.iter().map(|o| o.option_order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4]);
        assert_eq!(question.options.iter().filter(|o| o.is_correct).count(), 1);
    }

    assert!(tests.get_test_with_questions(-1).await.unwrap().is_none());
}

#[tokio::test]
async fn re_answering_replaces_the_single_ledger_row() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool.clone());
    let attempts = PgAttemptRepository::new(pool);

    let test = tests.create_test(new_test(&[2], 60)).await.unwrap();
    let question = &test.questions[0];
    let attempt = attempts
        .create_attempt(fresh_user_id(), test.id, Utc::now())
        .await
        .unwrap();

    let first = attempts
        .upsert_answer(attempt.id, question.id, question.options[0].id, true)
        .await
        .unwrap();
    let second = attempts
        .upsert_answer(attempt.id, question.id, question.options[2].id, false)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let answers = attempts.list_answers(attempt.id).await.unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].selected_option_id, Some(question.options[2].id));
    assert_eq!(answers[0].is_correct, Some(false));
}

#[tokio::test]
async fn completion_is_single_shot() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool.clone());
    let attempts = PgAttemptRepository::new(pool);

    let test = tests.create_test(new_test(&[1, 2], 60)).await.unwrap();
    let attempt = attempts
        .create_attempt(fresh_user_id(), test.id, Utc::now())
        .await
        .unwrap();

    let first = attempts
        .complete_attempt(attempt.id, &record(2, 3, Utc::now()))
        .await
        .unwrap();
    assert_eq!(first.status, AttemptStatus::Completed);
    assert_eq!(first.score, Some(2));

    let err = attempts
        .complete_attempt(attempt.id, &record(3, 3, Utc::now()))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    let stored = attempts.get_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(stored.score, Some(2));
    assert_eq!(stored.completed_at, first.completed_at);

    assert!(matches!(
        attempts.abandon_attempt(attempt.id).await,
        Err(CoreError::InvalidState(_))
    ));
    assert!(matches!(
        attempts.complete_attempt(-1, &record(0, 0, Utc::now())).await,
        Err(CoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn completion_dates_are_distinct_utc_days_newest_first() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool.clone());
    let attempts = PgAttemptRepository::new(pool.clone());
    let stats = PgStatsRepository::new(pool);

    let test = tests.create_test(new_test(&[1], 60)).await.unwrap();
    let user_id = fresh_user_id();

    // Two completions on 2024-03-10 (one just before UTC midnight), one on the 9th.
    completed(&attempts, user_id, &test, 1, at(2024, 3, 10, 1)).await;
    completed(&attempts, user_id, &test, 1, at(2024, 3, 10, 23)).await;
    completed(&attempts, user_id, &test, 0, at(2024, 3, 9, 12)).await;

    // Abandoned attempts never count.
    let abandoned = attempts
        .create_attempt(user_id, test.id, at(2024, 3, 12, 8))
        .await
        .unwrap();
    attempts.abandon_attempt(abandoned.id).await.unwrap();

    let dates = stats.list_completion_dates(user_id).await.unwrap();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
        ]
    );
}

#[tokio::test]
async fn trend_windows_split_newest_five_from_the_next_five() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool.clone());
    let attempts = PgAttemptRepository::new(pool.clone());
    let stats_repo = Arc::new(PgStatsRepository::new(pool.clone()));
    let attempt_repo = Arc::new(PgAttemptRepository::new(pool));

    let test = tests.create_test(new_test(&[10], 60)).await.unwrap();
    let zero_points = tests.create_test(new_test(&[], 60)).await.unwrap();
    let user_id = fresh_user_id();

    // Oldest to newest: five attempts at 4/10, then five at 8/10, then one
    // unscored attempt that the windows skip.
    for day in 1..=5 {
        completed(&attempts, user_id, &test, 4, at(2024, 5, day, 9)).await;
    }
    for day in 6..=10 {
        completed(&attempts, user_id, &test, 8, at(2024, 5, day, 9)).await;
    }
    completed(&attempts, user_id, &zero_points, 0, at(2024, 5, 11, 9)).await;

    let recent = stats_repo
        .list_recent_completed(user_id, 5, 0)
        .await
        .unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.iter().all(|r| r.score == 8));

    let service = StatsService::new(stats_repo, attempt_repo, Duration::from_secs(5));
    let trend = service.trend(user_id).await.unwrap();
    assert_eq!(trend.recent_average, 80.0);
    assert_eq!(trend.previous_average, 40.0);
    assert_eq!(trend.improvement, 40.0);
}

#[tokio::test]
async fn search_filters_by_status_and_title() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool.clone());
    let attempts = PgAttemptRepository::new(pool);

    let mut fixture = new_test(&[1], 60);
    let marker = format!("Search marker {}", fresh_user_id());
    fixture.title = marker.clone();
    let test = tests.create_test(fixture).await.unwrap();
    let user_id = fresh_user_id();

    completed(&attempts, user_id, &test, 1, Utc::now()).await;
    attempts
        .create_attempt(user_id, test.id, Utc::now())
        .await
        .unwrap();

    let params = AttemptSearchParams {
        user_id: Some(user_id),
        status: Some(AttemptStatus::InProgress),
        test_title: Some(marker.to_lowercase()),
        ..Default::default()
    };
    let rows = attempts.search_attempts(&params).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AttemptStatus::InProgress);
    assert_eq!(rows[0].test_title, marker);

    let params = AttemptSearchParams {
        user_id: Some(user_id),
        score_min: Some(1),
        ..Default::default()
    };
    let rows = attempts.search_attempts(&params).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, AttemptStatus::Completed);
}

#[tokio::test]
async fn update_test_replaces_metadata_only() {
    let Some(pool) = pool().await else { return };
    let tests = PgTestRepository::new(pool);

    let test = tests.create_test(new_test(&[1, 2], 60)).await.unwrap();
    let update = UpdateTestRequest {
        title: "Renamed".to_string(),
        description: "Edited".to_string(),
        exam_standard: "A-Level".to_string(),
        difficulty: "Hard".to_string(),
        time_limit_minutes: 45,
        passing_score: 90,
    };

    let updated = tests.update_test(test.id, &update).await.unwrap().unwrap();
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.passing_score, 90);
    assert_eq!(updated.questions.len(), 2);
    assert!(updated.updated_at >= test.updated_at);

    assert!(tests.update_test(-1, &update).await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_completions_for_one_user_keep_the_rollup_exact() {
    let Some(pool) = pool().await else { return };
    let tests = Arc::new(PgTestRepository::new(pool.clone()));
    let attempts = Arc::new(PgAttemptRepository::new(pool.clone()));
    let stats_repo = Arc::new(PgStatsRepository::new(pool));

    let deadline = Duration::from_secs(10);
    let stats = StatsService::new(stats_repo.clone(), attempts.clone(), deadline);
    let service = AttemptService::new(
        tests.clone(),
        attempts.clone(),
        attempts.clone(),
        stats.clone(),
        deadline,
    );

    let test = tests.create_test(new_test(&[1, 2], 50)).await.unwrap();
    let question = &test.questions[1];
    let user_id = fresh_user_id();

    let mut attempt_ids = Vec::new();
    for _ in 0..16 {
        let attempt = service.start(user_id, test.id, false).await.unwrap();
        service
            .submit_answer(attempt.id, question.id, question.options[0].id)
            .await
            .unwrap();
        attempt_ids.push(attempt.id);
    }

    let handles: Vec<_> = attempt_ids
        .into_iter()
        .map(|id| {
            let service = service.clone();
            tokio::spawn(async move { service.complete(id).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().stats_updated);
    }

    let incremental = stats.load(user_id).await.unwrap();
    assert_eq!(incremental.tests_completed, 16);
    assert_eq!(incremental.total_points, 32);
    assert_eq!(incremental.tests_passed, 16);
    assert!(incremental.same_totals(&stats.replay(user_id).await.unwrap()));

    let stored = stats_repo.get_stats(user_id).await.unwrap().unwrap();
    assert_eq!(stored.tests_completed, 16);
}
