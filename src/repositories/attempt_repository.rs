// src/repositories/attempt_repository.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::{CoreError, CoreResult},
    models::attempt::{
        AttemptSearchParams, AttemptSummary, CompletionRecord, StudentAnswer,
        TestAttempt,
    },
};

/// Storage for attempt rows and their state transitions.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn create_attempt(
        &self,
        user_id: i64,
        test_id: i64,
        started_at: DateTime<Utc>,
    ) -> CoreResult<TestAttempt>;

    async fn get_attempt(&self, attempt_id: i64) -> CoreResult<Option<TestAttempt>>;

    /// Moves an in-progress attempt to `completed`, writing the score, total,
    /// completion time and duration in one atomic step.
    ///
    /// Fails with `NotFound` for an unknown attempt and `InvalidState` when the
    /// attempt is already terminal; in both cases nothing is written.
    async fn complete_attempt(
        &self,
        attempt_id: i64,
        record: &CompletionRecord,
    ) -> CoreResult<TestAttempt>;

    /// Moves an in-progress attempt to `abandoned`. Same failure modes as
    /// `complete_attempt`.
    async fn abandon_attempt(&self, attempt_id: i64) -> CoreResult<TestAttempt>;

    /// A user's attempts joined with their test, most recent activity first.
    async fn list_user_attempts(&self, user_id: i64, limit: i64) -> CoreResult<Vec<AttemptSummary>>;

    async fn search_attempts(&self, params: &AttemptSearchParams)
    -> CoreResult<Vec<AttemptSummary>>;
}

/// The answer ledger: at most one answer per (attempt, question).
#[async_trait]
pub trait AnswerRepository: Send + Sync {
    /// Inserts or overwrites the answer for `(attempt_id, question_id)`,
    /// refreshing `answered_at`.
    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        option_id: i64,
        is_correct: bool,
    ) -> CoreResult<StudentAnswer>;

    async fn list_answers(&self, attempt_id: i64) -> CoreResult<Vec<StudentAnswer>>;
}

const ATTEMPT_COLUMNS: &str = "\
    id, user_id, test_id, started_at, completed_at, score, total_points, \
    time_taken_seconds, status, created_at";

const SUMMARY_SELECT: &str = "\
    SELECT a.id, a.user_id, a.test_id, t.title AS test_title, t.passing_score, \
           a.started_at, a.completed_at, a.score, a.total_points, \
           a.time_taken_seconds, a.status \
    FROM test_attempts a \
    JOIN tests t ON t.id = a.test_id";

pub struct PgAttemptRepository {
    pool: PgPool,
}

impl PgAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Explains why a guarded transition touched no rows.
    async fn transition_failure(&self, attempt_id: i64, action: &str) -> CoreError {
        match self.get_attempt(attempt_id).await {
            Ok(Some(attempt)) => CoreError::InvalidState(format!(
                "cannot {} attempt {}: status is {}",
                action,
                attempt_id,
                attempt.status.as_str()
            )),
            Ok(None) => CoreError::NotFound(format!("attempt {}", attempt_id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl AttemptRepository for PgAttemptRepository {
    async fn create_attempt(
        &self,
        user_id: i64,
        test_id: i64,
        started_at: DateTime<Utc>,
    ) -> CoreResult<TestAttempt> {
        let attempt = sqlx::query_as::<_, TestAttempt>(&format!(
            r#"
            INSERT INTO test_attempts (user_id, test_id, started_at, status)
            VALUES ($1, $2, $3, 'in_progress')
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(test_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn get_attempt(&self, attempt_id: i64) -> CoreResult<Option<TestAttempt>> {
        let attempt = sqlx::query_as::<_, TestAttempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM test_attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn complete_attempt(
        &self,
        attempt_id: i64,
        record: &CompletionRecord,
    ) -> CoreResult<TestAttempt> {
        // The status guard in the WHERE clause makes the transition single-shot
        // even when two submissions race.
        let updated = sqlx::query_as::<_, TestAttempt>(&format!(
            r#"
            UPDATE test_attempts
            SET status = 'completed',
                completed_at = $2,
                score = $3,
                total_points = $4,
                time_taken_seconds = $5
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(attempt_id)
        .bind(record.completed_at)
        .bind(record.score)
        .bind(record.total_points)
        .bind(record.time_taken_seconds)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(attempt) => Ok(attempt),
            None => Err(self.transition_failure(attempt_id, "complete").await),
        }
    }

    async fn abandon_attempt(&self, attempt_id: i64) -> CoreResult<TestAttempt> {
        let updated = sqlx::query_as::<_, TestAttempt>(&format!(
            r#"
            UPDATE test_attempts
            SET status = 'abandoned'
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(attempt) => Ok(attempt),
            None => Err(self.transition_failure(attempt_id, "abandon").await),
        }
    }

    async fn list_user_attempts(&self, user_id: i64, limit: i64) -> CoreResult<Vec<AttemptSummary>> {
        let rows = sqlx::query_as::<_, AttemptSummary>(&format!(
            r#"
            {SUMMARY_SELECT}
            WHERE a.user_id = $1
            ORDER BY COALESCE(a.completed_at, a.started_at) DESC, a.id DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn search_attempts(
        &self,
        params: &AttemptSearchParams,
    ) -> CoreResult<Vec<AttemptSummary>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(SUMMARY_SELECT);
        builder.push(" WHERE 1 = 1");

        if let Some(user_id) = params.user_id {
            builder.push(" AND a.user_id = ").push_bind(user_id);
        }
        if let Some(test_id) = params.test_id {
            builder.push(" AND a.test_id = ").push_bind(test_id);
        }
        if let Some(status) = params.status {
            builder.push(" AND a.status = ").push_bind(status);
        }
        if let Some(title) = params.test_title.as_deref().filter(|t| !t.trim().is_empty()) {
            builder
                .push(" AND t.title ILIKE ")
                .push_bind(format!("%{}%", title.trim()));
        }
        if let Some(from) = params.date_from {
            builder.push(" AND COALESCE(a.completed_at, a.started_at) >= ").push_bind(from);
        }
        if let Some(to) = params.date_to {
            builder.push(" AND COALESCE(a.completed_at, a.started_at) <= ").push_bind(to);
        }
        if let Some(min) = params.score_min {
            builder.push(" AND a.score >= ").push_bind(min);
        }
        if let Some(max) = params.score_max {
            builder.push(" AND a.score <= ").push_bind(max);
        }

        builder.push(" ORDER BY COALESCE(a.completed_at, a.started_at) DESC, a.id DESC LIMIT ");
        builder.push_bind(params.effective_limit());

        let rows = builder
            .build_query_as::<AttemptSummary>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AnswerRepository for PgAttemptRepository {
    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        option_id: i64,
        is_correct: bool,
    ) -> CoreResult<StudentAnswer> {
        let answer = sqlx::query_as::<_, StudentAnswer>(
            r#"
            INSERT INTO student_answers (attempt_id, question_id, selected_option_id, is_correct, answered_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (attempt_id, question_id) DO UPDATE
            SET selected_option_id = EXCLUDED.selected_option_id,
                is_correct = EXCLUDED.is_correct,
                answered_at = NOW()
            RETURNING id, attempt_id, question_id, selected_option_id, is_correct, answered_at
            "#,
        )
        .bind(attempt_id)
        .bind(question_id)
        .bind(option_id)
        .bind(is_correct)
        .fetch_one(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn list_answers(&self, attempt_id: i64) -> CoreResult<Vec<StudentAnswer>> {
        let answers = sqlx::query_as::<_, StudentAnswer>(
            r#"
            SELECT id, attempt_id, question_id, selected_option_id, is_correct, answered_at
            FROM student_answers
            WHERE attempt_id = $1
            ORDER BY question_id
            "#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }
}
