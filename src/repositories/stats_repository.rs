// src/repositories/stats_repository.rs

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgExecutor, PgPool};

use crate::{
    error::CoreResult,
    models::stats::{CompletedOutcome, RecentScore, StreakStats, UserStats},
};

/// Per-user rollups plus the read-only history queries used to derive them.
#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn get_stats(&self, user_id: i64) -> CoreResult<Option<UserStats>>;

    /// Folds one completion into the user's rollup, creating the row if
    /// missing, and recomputes the streak from completion dates.
    ///
    /// Runs as one atomic step: concurrent calls for the same user are
    /// serialized, so every completion is counted exactly once.
    async fn record_completion(
        &self,
        user_id: i64,
        score: i32,
        passed: bool,
    ) -> CoreResult<UserStats>;

    /// Overwrites the rollup with absolute values.
    async fn save_stats(&self, stats: &UserStats) -> CoreResult<()>;

    /// Distinct UTC calendar dates of the user's completed attempts, newest first.
    async fn list_completion_dates(&self, user_id: i64) -> CoreResult<Vec<NaiveDate>>;

    /// Completed attempts with a positive total, newest first.
    async fn list_recent_completed(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<RecentScore>>;

    /// Every completed attempt of the user in completion order, with the
    /// passing threshold of its test.
    async fn list_completed_outcomes(&self, user_id: i64) -> CoreResult<Vec<CompletedOutcome>>;
}

const STATS_COLUMNS: &str =
    "user_id, total_points, tests_completed, tests_passed, current_streak, best_streak, updated_at";

async fn completion_dates<'e>(
    executor: impl PgExecutor<'e>,
    user_id: i64,
) -> CoreResult<Vec<NaiveDate>> {
    let dates = sqlx::query_scalar::<_, NaiveDate>(
        r#"
        SELECT DISTINCT (completed_at AT TIME ZONE 'UTC')::date AS completion_date
        FROM test_attempts
        WHERE user_id = $1 AND status = 'completed' AND completed_at IS NOT NULL
        ORDER BY completion_date DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await?;
    Ok(dates)
}

pub struct PgStatsRepository {
    pool: PgPool,
}

impl PgStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    async fn get_stats(&self, user_id: i64) -> CoreResult<Option<UserStats>> {
        let stats = sqlx::query_as::<_, UserStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM user_stats WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stats)
    }

    async fn record_completion(
        &self,
        user_id: i64,
        score: i32,
        passed: bool,
    ) -> CoreResult<UserStats> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO user_stats (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Row lock held until commit; a concurrent completion waits here and
        // then reads the counters this one wrote.
        let mut stats = sqlx::query_as::<_, UserStats>(&format!(
            "SELECT {STATS_COLUMNS} FROM user_stats WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        stats.apply_completion(score, passed);
        let dates = completion_dates(&mut *tx, user_id).await?;
        stats.set_streak(StreakStats::from_dates(&dates));

        let stats = sqlx::query_as::<_, UserStats>(&format!(
            r#"
            UPDATE user_stats
            SET total_points = $2,
                tests_completed = $3,
                tests_passed = $4,
                current_streak = $5,
                best_streak = $6,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {STATS_COLUMNS}
            "#
        ))
        .bind(stats.user_id)
        .bind(stats.total_points)
        .bind(stats.tests_completed)
        .bind(stats.tests_passed)
        .bind(stats.current_streak)
        .bind(stats.best_streak)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stats)
    }

    async fn save_stats(&self, stats: &UserStats) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_stats (user_id, total_points, tests_completed, tests_passed,
                                    current_streak, best_streak, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET total_points = EXCLUDED.total_points,
                tests_completed = EXCLUDED.tests_completed,
                tests_passed = EXCLUDED.tests_passed,
                current_streak = EXCLUDED.current_streak,
                best_streak = EXCLUDED.best_streak,
                updated_at = NOW()
            "#,
        )
        .bind(stats.user_id)
        .bind(stats.total_points)
        .bind(stats.tests_completed)
        .bind(stats.tests_passed)
        .bind(stats.current_streak)
        .bind(stats.best_streak)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_completion_dates(&self, user_id: i64) -> CoreResult<Vec<NaiveDate>> {
        completion_dates(&self.pool, user_id).await
    }

    async fn list_recent_completed(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<RecentScore>> {
        let rows = sqlx::query_as::<_, RecentScore>(
            r#"
            SELECT score, total_points
            FROM test_attempts
            WHERE user_id = $1
              AND status = 'completed'
              AND score IS NOT NULL
              AND total_points > 0
            ORDER BY completed_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_completed_outcomes(&self, user_id: i64) -> CoreResult<Vec<CompletedOutcome>> {
        let rows = sqlx::query_as::<_, CompletedOutcome>(
            r#"
            SELECT a.id AS attempt_id, a.score, a.total_points, t.passing_score, a.completed_at
            FROM test_attempts a
            JOIN tests t ON t.id = a.test_id
            WHERE a.user_id = $1
              AND a.status = 'completed'
              AND a.score IS NOT NULL
              AND a.total_points IS NOT NULL
              AND a.completed_at IS NOT NULL
            ORDER BY a.completed_at, a.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
