// src/services/attempt_service.rs

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

use crate::{
    error::{CoreError, CoreResult},
    models::{
        attempt::{
            AttemptResultsResponse, AttemptStatus, CompletionRecord, QuestionReview,
            StudentAnswer, TestAttempt,
        },
        test::Test,
    },
    repositories::{AnswerRepository, AttemptRepository, TestRepository},
};

use super::{StatsService, grading, with_deadline};

/// Outcome of a successful completion.
#[derive(Debug, Serialize)]
pub struct CompletedAttempt {
    pub attempt: TestAttempt,
    pub percentage: f64,
    pub passed: bool,
    /// False when the attempt completed but the rollup could not be updated.
    pub stats_updated: bool,
}

/// An attempt together with its rubric and current ledger.
#[derive(Debug)]
pub struct AttemptSnapshot {
    pub attempt: TestAttempt,
    pub test: Test,
    pub answers: Vec<StudentAnswer>,
}

/// Drives an attempt from start through completion.
///
/// Ownership checks are the caller's job; every method here trusts the ids it
/// receives.
#[derive(Clone)]
pub struct AttemptService {
    tests: Arc<dyn TestRepository>,
    attempts: Arc<dyn AttemptRepository>,
    answers: Arc<dyn AnswerRepository>,
    stats: StatsService,
    deadline: Duration,
}

impl AttemptService {
    pub fn new(
        tests: Arc<dyn TestRepository>,
        attempts: Arc<dyn AttemptRepository>,
        answers: Arc<dyn AnswerRepository>,
        stats: StatsService,
        deadline: Duration,
    ) -> Self {
        Self {
            tests,
            attempts,
            answers,
            stats,
            deadline,
        }
    }

    async fn load_test(&self, test_id: i64) -> CoreResult<Test> {
        self.tests
            .get_test_with_questions(test_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("test {}", test_id)))
    }

    async fn load_attempt(&self, attempt_id: i64) -> CoreResult<TestAttempt> {
        self.attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))
    }

    fn ensure_in_progress(attempt: &TestAttempt) -> CoreResult<()> {
        if attempt.is_in_progress() {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "attempt {} is {}",
                attempt.id,
                attempt.status.as_str()
            )))
        }
    }

    /// Opens a new attempt. Unpublished tests look absent unless
    /// `include_unpublished` is set.
    pub async fn start(
        &self,
        user_id: i64,
        test_id: i64,
        include_unpublished: bool,
    ) -> CoreResult<TestAttempt> {
        let attempt = with_deadline(self.deadline, async {
            let test = self.load_test(test_id).await?;
            if !test.published && !include_unpublished {
                return Err(CoreError::NotFound(format!("test {}", test_id)));
            }
            self.attempts
                .create_attempt(user_id, test.id, Utc::now())
                .await
        })
        .await?;

        tracing::info!(attempt_id = attempt.id, user_id, test_id, "Attempt started");
        Ok(attempt)
    }

    pub async fn get_attempt(&self, attempt_id: i64) -> CoreResult<TestAttempt> {
        with_deadline(self.deadline, self.load_attempt(attempt_id)).await
    }

    pub async fn snapshot(&self, attempt_id: i64) -> CoreResult<AttemptSnapshot> {
        with_deadline(self.deadline, async {
            let attempt = self.load_attempt(attempt_id).await?;
            let test = self.load_test(attempt.test_id).await?;
            let answers = self.answers.list_answers(attempt_id).await?;
            Ok(AttemptSnapshot {
                attempt,
                test,
                answers,
            })
        })
        .await
    }

    /// Records (or replaces) the selection for one question and returns the
    /// stored ledger row.
    pub async fn submit_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        option_id: i64,
    ) -> CoreResult<StudentAnswer> {
        with_deadline(self.deadline, async {
            let attempt = self.load_attempt(attempt_id).await?;
            Self::ensure_in_progress(&attempt)?;

            let test = self.load_test(attempt.test_id).await?;
            let is_correct = grading::check_answer(&test, question_id, option_id)?;

            self.answers
                .upsert_answer(attempt_id, question_id, option_id, is_correct)
                .await
        })
        .await
    }

    /// Scores the attempt, marks it completed, then updates the user's rollup.
    ///
    /// The completion write is the only step that can fail the call; a stats
    /// failure is logged and surfaces as `stats_updated: false`. If the
    /// deadline fires after the store committed the completion, the attempt is
    /// re-read and the rollup is still updated.
    pub async fn complete(&self, attempt_id: i64) -> CoreResult<CompletedAttempt> {
        // Microsecond precision so the stored value compares equal on re-read.
        let completed_at = Utc::now().trunc_subsecs(6);

        let completion = with_deadline(self.deadline, async {
            let attempt = self.load_attempt(attempt_id).await?;
            Self::ensure_in_progress(&attempt)?;

            let test = self.load_test(attempt.test_id).await?;
            let answers = self.answers.list_answers(attempt_id).await?;
            let score = grading::score_attempt(&test, &answers);

            let record = CompletionRecord {
                score: score.score,
                total_points: score.total_points,
                time_taken_seconds: grading::elapsed_seconds(attempt.started_at, completed_at),
                completed_at,
            };

            let attempt = self.attempts.complete_attempt(attempt_id, &record).await?;
            Ok((attempt, test.passing_score))
        })
        .await;

        let (attempt, passing_score) = match completion {
            Ok(completed) => completed,
            Err(CoreError::DeadlineExceeded) => {
                match self.committed_completion(attempt_id, completed_at).await {
                    Ok(Some(completed)) => {
                        tracing::warn!(
                            attempt_id,
                            "Completion committed after the deadline; continuing"
                        );
                        completed
                    }
                    Ok(None) => return Err(CoreError::DeadlineExceeded),
                    Err(e) => {
                        tracing::error!(
                            attempt_id,
                            error = %e,
                            "Could not check attempt after completion deadline"
                        );
                        return Err(CoreError::DeadlineExceeded);
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let score = attempt.score.unwrap_or_default();
        let total_points = attempt.total_points.unwrap_or_default();
        let percentage = grading::percentage(score, total_points);
        let passed = grading::is_passing(percentage, passing_score);

        tracing::info!(
            attempt_id,
            user_id = attempt.user_id,
            score,
            total_points,
            passed,
            "Attempt completed"
        );

        let stats_updated = match self
            .stats
            .record_completion(attempt.user_id, score, passed)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    attempt_id,
                    user_id = attempt.user_id,
                    error = %e,
                    "Failed to update user stats after completion"
                );
                false
            }
        };

        Ok(CompletedAttempt {
            attempt,
            percentage,
            passed,
            stats_updated,
        })
    }

    /// Finds the completion this call wrote, if the store committed it.
    ///
    /// `completed_at` identifies the write: a concurrent completer stamps its
    /// own timestamp and updates the rollup itself.
    async fn committed_completion(
        &self,
        attempt_id: i64,
        completed_at: DateTime<Utc>,
    ) -> CoreResult<Option<(TestAttempt, i32)>> {
        with_deadline(self.deadline, async {
            let attempt = self.load_attempt(attempt_id).await?;
            if attempt.status != AttemptStatus::Completed
                || attempt.completed_at != Some(completed_at)
            {
                return Ok(None);
            }
            let test = self.load_test(attempt.test_id).await?;
            Ok(Some((attempt, test.passing_score)))
        })
        .await
    }

    /// Administrative transition `in_progress -> abandoned`.
    pub async fn abandon(&self, attempt_id: i64) -> CoreResult<TestAttempt> {
        let attempt = with_deadline(self.deadline, self.attempts.abandon_attempt(attempt_id)).await?;
        tracing::warn!(attempt_id, user_id = attempt.user_id, "Attempt abandoned");
        Ok(attempt)
    }

    /// Per-question review of a completed attempt, revealing correct options.
    pub async fn results(&self, attempt_id: i64) -> CoreResult<AttemptResultsResponse> {
        let AttemptSnapshot {
            attempt,
            test,
            answers,
        } = self.snapshot(attempt_id).await?;

        if attempt.status != AttemptStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "attempt {} is {}; results are available after completion",
                attempt_id,
                attempt.status.as_str()
            )));
        }

        let questions = test
            .questions
            .iter()
            .map(|question| {
                let answer = answers.iter().find(|a| a.question_id == question.id);
                let is_correct = answer.is_some_and(|a| a.is_correct == Some(true));
                QuestionReview {
                    question_id: question.id,
                    question_text: question.question_text.clone(),
                    points: question.points,
                    selected_option_id: answer.and_then(|a| a.selected_option_id),
                    correct_option_id: question.correct_option().map(|opt| opt.id),
                    is_correct,
                    points_earned: if is_correct { question.points } else { 0 },
                }
            })
            .collect();

        let percentage = attempt.percentage().unwrap_or_default();
        Ok(AttemptResultsResponse {
            passed: grading::is_passing(percentage, test.passing_score),
            percentage,
            test_title: test.title,
            passing_score: test.passing_score,
            attempt,
            questions,
        })
    }
}
