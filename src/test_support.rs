// src/test_support.rs

//! Fixtures shared by unit tests.

use std::time::Duration;

use chrono::Utc;

use crate::{
    config::Config,
    models::test::{
        AnswerOption, NewOption, NewQuestion, NewTest, OPTIONS_PER_QUESTION, Question, Test,
    },
};

pub const TEST_JWT_SECRET: &str = "unit_test_secret";

pub fn config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        server_addr: ([127, 0, 0, 1], 0).into(),
        db_max_connections: 1,
        db_acquire_timeout: Duration::from_secs(1),
        operation_timeout: Duration::from_secs(5),
    }
}

/// Builds an in-memory rubric with one question per weight.
///
/// Question ids are `test_id * 100 + n`, option ids are `question_id * 10 + n`,
/// and the first option of every question is the correct one.
pub fn rubric(test_id: i64, weights: &[i32]) -> Test {
    let now = Utc::now();
    let questions = weights
        .iter()
        .enumerate()
        .map(|(i, &points)| {
            let question_id = test_id * 100 + i as i64 + 1;
            Question {
                id: question_id,
                test_id,
                question_text: format!("Question {}", i + 1),
                image_url: None,
                question_order: i as i32 + 1,
                points,
                options: (0..OPTIONS_PER_QUESTION)
                    .map(|j| AnswerOption {
                        id: question_id * 10 + j as i64 + 1,
                        question_id,
                        option_text: format!("Option {}", j + 1),
                        is_correct: j == 0,
                        option_order: j as i32 + 1,
                    })
                    .collect(),
            }
        })
        .collect();

    Test {
        id: test_id,
        title: format!("Test {}", test_id),
        description: "Fixture".to_string(),
        exam_standard: "GCSE".to_string(),
        difficulty: "Medium".to_string(),
        time_limit_minutes: 30,
        passing_score: 60,
        published: true,
        created_by: Some(1),
        created_at: now,
        updated_at: now,
        questions,
    }
}

/// A published test definition with one question per weight; the first
/// option of each question is correct.
pub fn sample_new_test(weights: &[i32]) -> NewTest {
    NewTest {
        title: "Fractions".to_string(),
        description: "Fixture".to_string(),
        exam_standard: "GCSE".to_string(),
        difficulty: "Easy".to_string(),
        time_limit_minutes: 15,
        passing_score: 60,
        published: true,
        created_by: Some(1),
        questions: weights
            .iter()
            .enumerate()
            .map(|(i, &points)| NewQuestion {
                question_text: format!("Question {}", i + 1),
                image_url: None,
                points,
                options: (0..OPTIONS_PER_QUESTION)
                    .map(|j| NewOption {
                        option_text: format!("Option {}", j + 1),
                        is_correct: j == 0,
                    })
                    .collect(),
            })
            .collect(),
    }
}
