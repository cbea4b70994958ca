// src/services/grading.rs

//! Pure scoring rules over a rubric. No I/O happens here.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::{
    error::{CoreError, CoreResult},
    models::{attempt::StudentAnswer, test::Test},
};

/// Decides whether selecting `option_id` answers `question_id` correctly.
///
/// * The question must belong to the test, otherwise `InvalidInput`.
/// * The option must exist somewhere in the test's rubric, otherwise `InvalidInput`.
/// * An option belonging to a different question is simply a wrong answer.
pub fn check_answer(test: &Test, question_id: i64, option_id: i64) -> CoreResult<bool> {
    let question = test.question(question_id).ok_or_else(|| {
        CoreError::InvalidInput(format!(
            "question {} does not belong to test {}",
            question_id, test.id
        ))
    })?;

    let (owner, option) = test.find_option(option_id).ok_or_else(|| {
        CoreError::InvalidInput(format!(
            "option {} does not belong to test {}",
            option_id, test.id
        ))
    })?;

    Ok(owner.id == question.id && option.is_correct)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub score: i32,
    pub total_points: i32,
}

/// Sums the weights of correctly answered questions against the full rubric.
///
/// Unanswered questions contribute 0; ledger rows for questions outside the
/// test are ignored.
pub fn score_attempt(test: &Test, answers: &[StudentAnswer]) -> Score {
    let correct: HashSet<i64> = answers
        .iter()
        .filter(|a| a.is_correct == Some(true))
        .map(|a| a.question_id)
        .collect();

    let score = test
        .questions
        .iter()
        .filter(|q| correct.contains(&q.id))
        .map(|q| q.points)
        .sum();

    Score {
        score,
        total_points: test.total_points(),
    }
}

/// `100 * score / total_points`, or 0 when the rubric carries no points.
pub fn percentage(score: i32, total_points: i32) -> f64 {
    if total_points <= 0 {
        return 0.0;
    }
    (f64::from(score) * 100.0) / f64::from(total_points)
}

pub fn is_passing(percentage: f64, passing_score: i32) -> bool {
    percentage >= f64::from(passing_score)
}

/// Whole seconds between start and completion, floored and never negative.
pub fn elapsed_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> i32 {
    let secs = (completed_at - started_at).num_seconds().max(0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}
