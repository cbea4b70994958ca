// src/services/stats_service.rs

use std::{sync::Arc, time::Duration};

use crate::{
    error::CoreResult,
    models::{
        attempt::AttemptView,
        stats::{DashboardResponse, RecentScore, StreakStats, TrendStats, UserStats},
    },
    repositories::{AttemptRepository, StatsRepository},
};

use super::{grading, with_deadline};

/// Size of each trend window (recent vs the one before it).
pub const TREND_WINDOW: i64 = 5;

const DASHBOARD_RECENT_ATTEMPTS: i64 = 10;

/// Mean percentage over the given attempts; 0 for an empty window.
pub fn average_percentage(scores: &[RecentScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: f64 = scores
        .iter()
        .map(|s| grading::percentage(s.score, s.total_points))
        .sum();
    sum / scores.len() as f64
}

pub fn trend(recent: &[RecentScore], previous: &[RecentScore]) -> TrendStats {
    let recent_average = average_percentage(recent);
    let previous_average = average_percentage(previous);
    TrendStats {
        recent_average,
        previous_average,
        improvement: recent_average - previous_average,
    }
}

/// Maintains per-user rollups and answers the read-side statistics queries.
#[derive(Clone)]
pub struct StatsService {
    stats: Arc<dyn StatsRepository>,
    attempts: Arc<dyn AttemptRepository>,
    deadline: Duration,
}

impl StatsService {
    pub fn new(
        stats: Arc<dyn StatsRepository>,
        attempts: Arc<dyn AttemptRepository>,
        deadline: Duration,
    ) -> Self {
        Self {
            stats,
            attempts,
            deadline,
        }
    }

    /// Folds one freshly completed attempt into the user's rollup and
    /// recomputes the streak from history. The store applies both under one
    /// lock so concurrent completions for a user never overwrite each other.
    pub async fn record_completion(
        &self,
        user_id: i64,
        score: i32,
        passed: bool,
    ) -> CoreResult<UserStats> {
        with_deadline(
            self.deadline,
            self.stats.record_completion(user_id, score, passed),
        )
        .await
    }

    /// Current rollup, or a zeroed one when the user has never completed a test.
    pub async fn load(&self, user_id: i64) -> CoreResult<UserStats> {
        with_deadline(self.deadline, async {
            let stats = self.stats.get_stats(user_id).await?;
            Ok(stats.unwrap_or_else(|| UserStats::zeroed(user_id)))
        })
        .await
    }

    pub async fn streak(&self, user_id: i64) -> CoreResult<StreakStats> {
        with_deadline(self.deadline, async {
            let dates = self.stats.list_completion_dates(user_id).await?;
            Ok(StreakStats::from_dates(&dates))
        })
        .await
    }

    /// Average of the last five scored attempts against the five before them.
    pub async fn trend(&self, user_id: i64) -> CoreResult<TrendStats> {
        with_deadline(self.deadline, async {
            let recent = self
                .stats
                .list_recent_completed(user_id, TREND_WINDOW, 0)
                .await?;
            let previous = self
                .stats
                .list_recent_completed(user_id, TREND_WINDOW, TREND_WINDOW)
                .await?;
            Ok(trend(&recent, &previous))
        })
        .await
    }

    /// Recomputes the rollup from completed-attempt history without saving it.
    pub async fn replay(&self, user_id: i64) -> CoreResult<UserStats> {
        with_deadline(self.deadline, async {
            let outcomes = self.stats.list_completed_outcomes(user_id).await?;
            let dates = self.stats.list_completion_dates(user_id).await?;

            let mut stats = UserStats::zeroed(user_id);
            for outcome in &outcomes {
                let pct = grading::percentage(outcome.score, outcome.total_points);
                stats.apply_completion(outcome.score, grading::is_passing(pct, outcome.passing_score));
            }
            stats.set_streak(StreakStats::from_dates(&dates));
            Ok(stats)
        })
        .await
    }

    /// Replays history and overwrites the stored rollup with the result.
    pub async fn rebuild(&self, user_id: i64) -> CoreResult<UserStats> {
        let stats = self.replay(user_id).await?;
        with_deadline(self.deadline, self.stats.save_stats(&stats)).await?;
        tracing::info!(
            user_id,
            tests_completed = stats.tests_completed,
            "User stats rebuilt from history"
        );
        Ok(stats)
    }

    pub async fn dashboard(&self, user_id: i64) -> CoreResult<DashboardResponse> {
        let stats = self.load(user_id).await?;
        let streak = self.streak(user_id).await?;
        let trend = self.trend(user_id).await?;

        let (average_score, recent) = with_deadline(self.deadline, async {
            let outcomes = self.stats.list_completed_outcomes(user_id).await?;
            let scored: Vec<RecentScore> = outcomes
                .iter()
                .filter(|o| o.total_points > 0)
                .map(|o| RecentScore {
                    score: o.score,
                    total_points: o.total_points,
                })
                .collect();
            let recent = self
                .attempts
                .list_user_attempts(user_id, DASHBOARD_RECENT_ATTEMPTS)
                .await?;
            Ok((average_percentage(&scored), recent))
        })
        .await?;

        Ok(DashboardResponse {
            stats,
            streak,
            trend,
            average_score,
            recent_attempts: recent.into_iter().map(AttemptView::from).collect(),
        })
    }
}
