// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::test::PublicTest;
use crate::services::grading;

/// Lifecycle of a test attempt. `Completed` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }
}

/// Represents the 'test_attempts' table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TestAttempt {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Sum of the weights of correctly answered questions. Set on completion.
    pub score: Option<i32>,

    /// Sum of all question weights at completion time.
    pub total_points: Option<i32>,

    pub time_taken_seconds: Option<i32>,
    pub status: AttemptStatus,
    pub created_at: DateTime<Utc>,
}

impl TestAttempt {
    pub fn is_in_progress(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    /// Derived percentage; `None` until the attempt has been scored.
    pub fn percentage(&self) -> Option<f64> {
        match (self.score, self.total_points) {
            (Some(score), Some(total)) => Some(grading::percentage(score, total)),
            _ => None,
        }
    }
}

/// Represents the 'student_answers' table (the answer ledger).
/// One row per (attempt_id, question_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub id: i64,
    pub attempt_id: i64,
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub is_correct: Option<bool>,
    pub answered_at: DateTime<Utc>,
}

/// Values written atomically when an attempt transitions to `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub score: i32,
    pub total_points: i32,
    pub time_taken_seconds: i32,
    pub completed_at: DateTime<Utc>,
}

/// Attempt row joined with its test, used for listings and search.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AttemptSummary {
    pub id: i64,
    pub user_id: i64,
    pub test_id: i64,
    pub test_title: String,
    pub passing_score: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub score: Option<i32>,
    pub total_points: Option<i32>,
    pub time_taken_seconds: Option<i32>,
    pub status: AttemptStatus,
}

/// `AttemptSummary` with the read-time derived fields.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    #[serde(flatten)]
    pub summary: AttemptSummary,
    pub percentage: Option<f64>,
    pub passed: Option<bool>,
}

impl From<AttemptSummary> for AttemptView {
    fn from(summary: AttemptSummary) -> Self {
        let percentage = match (summary.score, summary.total_points) {
            (Some(score), Some(total)) if summary.status == AttemptStatus::Completed => {
                Some(grading::percentage(score, total))
            }
            _ => None,
        };
        let passed = percentage.map(|pct| grading::is_passing(pct, summary.passing_score));
        Self {
            summary,
            percentage,
            passed,
        }
    }
}

/// Query parameters for the staff attempt search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttemptSearchParams {
    pub user_id: Option<i64>,
    pub test_id: Option<i64>,
    pub status: Option<AttemptStatus>,
    /// Case-insensitive substring of the test title.
    pub test_title: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub score_min: Option<i32>,
    pub score_max: Option<i32>,
    pub limit: Option<i64>,
}

impl AttemptSearchParams {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// DTO for submitting a single answer.
#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub option_id: i64,
}

/// Immediate feedback for a submitted answer. Never names the correct option.
#[derive(Debug, Serialize)]
pub struct AnswerFeedback {
    pub question_id: i64,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
    pub message: &'static str,
}

/// A saved selection, as shown while the attempt is still running.
#[derive(Debug, Serialize)]
pub struct SavedSelection {
    pub question_id: i64,
    pub selected_option_id: Option<i64>,
    pub answered_at: DateTime<Utc>,
}

impl From<&StudentAnswer> for SavedSelection {
    fn from(answer: &StudentAnswer) -> Self {
        Self {
            question_id: answer.question_id,
            selected_option_id: answer.selected_option_id,
            answered_at: answer.answered_at,
        }
    }
}

/// Attempt state for resuming a test: the public rubric plus saved selections.
#[derive(Debug, Serialize)]
pub struct AttemptProgressResponse {
    pub attempt: TestAttempt,
    pub test: PublicTest,
    pub answers: Vec<SavedSelection>,
}

/// Response for a completed submission.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub attempt_id: i64,
    pub score: i32,
    pub total_points: i32,
    pub percentage: f64,
    pub passed: bool,
    pub time_taken_seconds: Option<i32>,
    pub stats_updated: bool,
}

/// Per-question review shown after completion.
#[derive(Debug, Serialize)]
pub struct QuestionReview {
    pub question_id: i64,
    pub question_text: String,
    pub points: i32,
    pub selected_option_id: Option<i64>,
    pub correct_option_id: Option<i64>,
    pub is_correct: bool,
    pub points_earned: i32,
}

#[derive(Debug, Serialize)]
pub struct AttemptResultsResponse {
    pub attempt: TestAttempt,
    pub test_title: String,
    pub passing_score: i32,
    pub percentage: f64,
    pub passed: bool,
    pub questions: Vec<QuestionReview>,
}
