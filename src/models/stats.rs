// src/models/stats.rs

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::attempt::AttemptView;

/// Represents the 'user_stats' table: one rollup row per user.
///
/// Maintained incrementally on each completion, but always reproducible by
/// replaying the user's completed attempts.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserStats {
    pub user_id: i64,
    pub total_points: i32,
    pub tests_completed: i32,
    pub tests_passed: i32,
    pub current_streak: i32,
    pub best_streak: i32,
    pub updated_at: DateTime<Utc>,
}

impl UserStats {
    pub fn zeroed(user_id: i64) -> Self {
        Self {
            user_id,
            total_points: 0,
            tests_completed: 0,
            tests_passed: 0,
            current_streak: 0,
            best_streak: 0,
            updated_at: Utc::now(),
        }
    }

    /// Folds one completed attempt into the rollup.
    pub fn apply_completion(&mut self, score: i32, passed: bool) {
        self.total_points += score;
        self.tests_completed += 1;
        if passed {
            self.tests_passed += 1;
        }
    }

    pub fn set_streak(&mut self, streak: StreakStats) {
        self.current_streak = streak.current;
        self.best_streak = streak.best;
    }

    /// Compares the counters, ignoring `updated_at`.
    pub fn same_totals(&self, other: &UserStats) -> bool {
        self.user_id == other.user_id
            && self.total_points == other.total_points
            && self.tests_completed == other.tests_completed
            && self.tests_passed == other.tests_passed
            && self.current_streak == other.current_streak
            && self.best_streak == other.best_streak
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreakStats {
    pub current: i32,
    pub best: i32,
}

impl StreakStats {
    /// Walks distinct completion dates, newest first.
    ///
    /// A run continues while each date is exactly one day before the previous
    /// one. `current` is whatever run is open when the walk ends, so it is not
    /// anchored to today. `best` is the longest run seen.
    pub fn from_dates(dates_desc: &[NaiveDate]) -> Self {
        let Some((&first, rest)) = dates_desc.split_first() else {
            return Self::default();
        };

        let mut current = 1;
        let mut best = 0;
        let mut previous = first;

        for &date in rest {
            if date == previous {
                continue;
            }
            if previous.checked_sub_days(Days::new(1)) == Some(date) {
                current += 1;
                best = best.max(current);
            } else {
                best = best.max(current);
                current = 1;
            }
            previous = date;
        }

        Self {
            current,
            best: best.max(current),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendStats {
    pub recent_average: f64,
    pub previous_average: f64,
    pub improvement: f64,
}

/// Score/total pair of a completed attempt, newest first.
#[derive(Debug, Clone, Copy, PartialEq, FromRow)]
pub struct RecentScore {
    pub score: i32,
    pub total_points: i32,
}

/// Everything needed to replay one completed attempt into a rollup.
#[derive(Debug, Clone, FromRow)]
pub struct CompletedOutcome {
    pub attempt_id: i64,
    pub score: i32,
    pub total_points: i32,
    pub passing_score: i32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub stats: UserStats,
    pub streak: StreakStats,
    pub trend: TrendStats,
    pub average_score: f64,
    pub recent_attempts: Vec<AttemptView>,
}
