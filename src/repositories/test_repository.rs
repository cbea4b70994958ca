// src/repositories/test_repository.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    error::CoreResult,
    models::test::{AnswerOption, NewTest, Question, Test, UpdateTestRequest},
};

/// Rubric provider plus the authoring operations teachers need.
#[async_trait]
pub trait TestRepository: Send + Sync {
    /// Loads a test with its questions (by order) and their options (by order).
    async fn get_test_with_questions(&self, test_id: i64) -> CoreResult<Option<Test>>;

    /// Published tests, newest first, without questions.
    async fn list_published(&self) -> CoreResult<Vec<Test>>;

    async fn list_by_creator(&self, user_id: i64) -> CoreResult<Vec<Test>>;

    /// Persists a test with all questions and options atomically.
    async fn create_test(&self, new_test: NewTest) -> CoreResult<Test>;

    /// Returns `false` when the test does not exist.
    async fn set_published(&self, test_id: i64, published: bool) -> CoreResult<bool>;

    /// Replaces the test's metadata, leaving questions untouched. Returns the
    /// updated test with its questions, or `None` when it does not exist.
    async fn update_test(
        &self,
        test_id: i64,
        update: &UpdateTestRequest,
    ) -> CoreResult<Option<Test>>;

    /// Deletes a test, cascading to questions, options, attempts and answers.
    /// Returns `false` when the test does not exist.
    async fn delete_test(&self, test_id: i64) -> CoreResult<bool>;
}

const TEST_COLUMNS: &str = "\
    id, title, description, exam_standard, difficulty, time_limit_minutes, \
    passing_score, published, created_by, created_at, updated_at";

pub struct PgTestRepository {
    pool: PgPool,
}

impl PgTestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_questions(&self, test_id: i64) -> CoreResult<Vec<Question>> {
        let mut questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT id, test_id, question_text, image_url, question_order, points
            FROM questions
            WHERE test_id = $1
            ORDER BY question_order
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        if questions.is_empty() {
            return Ok(questions);
        }

        let question_ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let options = sqlx::query_as::<_, AnswerOption>(
            r#"
            SELECT id, question_id, option_text, is_correct, option_order
            FROM answer_options
            WHERE question_id = ANY($1)
            ORDER BY question_id, option_order
            "#,
        )
        .bind(&question_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
        for option in options {
            by_question.entry(option.question_id).or_default().push(option);
        }
        for question in &mut questions {
            question.options = by_question.remove(&question.id).unwrap_or_default();
        }

        Ok(questions)
    }
}

#[async_trait]
impl TestRepository for PgTestRepository {
    async fn get_test_with_questions(&self, test_id: i64) -> CoreResult<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE id = $1"
        ))
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut test) = test else {
            return Ok(None);
        };
        test.questions = self.load_questions(test.id).await?;
        Ok(Some(test))
    }

    async fn list_published(&self) -> CoreResult<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE published = TRUE ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    async fn list_by_creator(&self, user_id: i64) -> CoreResult<Vec<Test>> {
        let tests = sqlx::query_as::<_, Test>(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE created_by = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests)
    }

    async fn create_test(&self, new_test: NewTest) -> CoreResult<Test> {
        let mut tx = self.pool.begin().await?;

        let mut test = sqlx::query_as::<_, Test>(&format!(
            r#"
            INSERT INTO tests (title, description, exam_standard, difficulty,
                               time_limit_minutes, passing_score, published, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TEST_COLUMNS}
            "#
        ))
        .bind(&new_test.title)
        .bind(&new_test.description)
        .bind(&new_test.exam_standard)
        .bind(&new_test.difficulty)
        .bind(new_test.time_limit_minutes)
        .bind(new_test.passing_score)
        .bind(new_test.published)
        .bind(new_test.created_by)
        .fetch_one(&mut *tx)
        .await?;

        for (index, new_question) in new_test.questions.into_iter().enumerate() {
            let mut question = sqlx::query_as::<_, Question>(
                r#"
                INSERT INTO questions (test_id, question_text, image_url, question_order, points)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, test_id, question_text, image_url, question_order, points
                "#,
            )
            .bind(test.id)
            .bind(&new_question.question_text)
            .bind(&new_question.image_url)
            .bind(index as i32 + 1)
            .bind(new_question.points)
            .fetch_one(&mut *tx)
            .await?;

            for (order, new_option) in new_question.options.into_iter().enumerate() {
                let option = sqlx::query_as::<_, AnswerOption>(
                    r#"
                    INSERT INTO answer_options (question_id, option_text, is_correct, option_order)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, question_id, option_text, is_correct, option_order
                    "#,
                )
                .bind(question.id)
                .bind(&new_option.option_text)
                .bind(new_option.is_correct)
                .bind(order as i32 + 1)
                .fetch_one(&mut *tx)
                .await?;
                question.options.push(option);
            }

            test.questions.push(question);
        }

        tx.commit().await?;
        Ok(test)
    }

    async fn set_published(&self, test_id: i64, published: bool) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tests SET published = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(test_id)
        .bind(published)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_test(
        &self,
        test_id: i64,
        update: &UpdateTestRequest,
    ) -> CoreResult<Option<Test>> {
        let test = sqlx::query_as::<_, Test>(&format!(
            r#"
            UPDATE tests
            SET title = $2,
                description = $3,
                exam_standard = $4,
                difficulty = $5,
                time_limit_minutes = $6,
                passing_score = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {TEST_COLUMNS}
            "#
        ))
        .bind(test_id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(&update.exam_standard)
        .bind(&update.difficulty)
        .bind(update.time_limit_minutes)
        .bind(update.passing_score)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut test) = test else {
            return Ok(None);
        };
        test.questions = self.load_questions(test.id).await?;
        Ok(Some(test))
    }

    async fn delete_test(&self, test_id: i64) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM tests WHERE id = $1")
            .bind(test_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
