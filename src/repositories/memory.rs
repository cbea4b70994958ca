// src/repositories/memory.rs

//! In-process store implementing every repository trait.
//!
//! Backs the HTTP tests and local runs without Postgres. All tables live under
//! one lock so guarded transitions behave like the SQL versions.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{CoreError, CoreResult},
    models::{
        attempt::{
            AttemptSearchParams, AttemptStatus, AttemptSummary, CompletionRecord, StudentAnswer,
            TestAttempt,
        },
        stats::{CompletedOutcome, RecentScore, StreakStats, UserStats},
        test::{AnswerOption, NewTest, Question, Test, UpdateTestRequest},
    },
};

use super::{AnswerRepository, AttemptRepository, StatsRepository, TestRepository};

#[derive(Default)]
struct Tables {
    next_id: i64,
    tests: BTreeMap<i64, Test>,
    attempts: BTreeMap<i64, TestAttempt>,
    answers: BTreeMap<(i64, i64), StudentAnswer>,
    stats: BTreeMap<i64, UserStats>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn summary(&self, attempt: &TestAttempt) -> Option<AttemptSummary> {
        let test = self.tests.get(&attempt.test_id)?;
        Some(AttemptSummary {
            id: attempt.id,
            user_id: attempt.user_id,
            test_id: attempt.test_id,
            test_title: test.title.clone(),
            passing_score: test.passing_score,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            score: attempt.score,
            total_points: attempt.total_points,
            time_taken_seconds: attempt.time_taken_seconds,
            status: attempt.status,
        })
    }

    fn completion_dates(&self, user_id: i64) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.status == AttemptStatus::Completed)
            .filter_map(|a| a.completed_at)
            .map(|at| at.date_naive())
            .collect();
        dates.into_iter().rev().collect()
    }

    /// Applies a guarded transition out of `in_progress`.
    fn transition(
        &mut self,
        attempt_id: i64,
        action: &str,
        apply: impl FnOnce(&mut TestAttempt),
    ) -> CoreResult<TestAttempt> {
        let attempt = self
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))?;

        if !attempt.is_in_progress() {
            return Err(CoreError::InvalidState(format!(
                "cannot {} attempt {}: status is {}",
                action,
                attempt_id,
                attempt.status.as_str()
            )));
        }

        apply(attempt);
        Ok(attempt.clone())
    }
}

/// Sorts summaries by most recent activity, matching the SQL ordering.
fn sort_by_activity(rows: &mut [AttemptSummary]) {
    rows.sort_by(|a, b| {
        let a_key = a.completed_at.unwrap_or(a.started_at);
        let b_key = b.completed_at.unwrap_or(b.started_at);
        b_key.cmp(&a_key).then(b.id.cmp(&a.id))
    });
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    write_delay: Option<Duration>,
    reply_delay: Option<Duration>,
    fail_stats_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays attempt state transitions before they touch any table.
    /// Used to exercise operation deadlines.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Delays the reply of attempt state transitions after they have been
    /// applied, like a backend that commits but answers late.
    pub fn with_reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    /// Makes every subsequent stats write fail with `StoreFailure`.
    pub fn fail_stats_writes(&self, fail: bool) {
        self.fail_stats_writes.store(fail, Ordering::SeqCst);
    }

    async fn delay_write(&self) {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn delay_reply(&self) {
        if let Some(delay) = self.reply_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_stats_writable(&self) -> CoreResult<()> {
        if self.fail_stats_writes.load(Ordering::SeqCst) {
            return Err(CoreError::StoreFailure("user_stats is unavailable".to_string()));
        }
        Ok(())
    }

    /// Rewrites when an attempt finished. Lets tests lay out completion dates.
    pub async fn set_completed_at(&self, attempt_id: i64, at: DateTime<Utc>) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        let attempt = tables
            .attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| CoreError::NotFound(format!("attempt {}", attempt_id)))?;
        attempt.completed_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl TestRepository for MemoryStore {
    async fn get_test_with_questions(&self, test_id: i64) -> CoreResult<Option<Test>> {
        let tables = self.tables.read().await;
        Ok(tables.tests.get(&test_id).cloned())
    }

    async fn list_published(&self) -> CoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut tests: Vec<Test> = tables
            .tests
            .values()
            .filter(|t| t.published)
            .map(|t| Test {
                questions: Vec::new(),
                ..t.clone()
            })
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tests)
    }

    async fn list_by_creator(&self, user_id: i64) -> CoreResult<Vec<Test>> {
        let tables = self.tables.read().await;
        let mut tests: Vec<Test> = tables
            .tests
            .values()
            .filter(|t| t.created_by == Some(user_id))
            .map(|t| Test {
                questions: Vec::new(),
                ..t.clone()
            })
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(tests)
    }

    async fn create_test(&self, new_test: NewTest) -> CoreResult<Test> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let test_id = tables.next_id();

        let mut questions = Vec::with_capacity(new_test.questions.len());
        for (index, new_question) in new_test.questions.into_iter().enumerate() {
            let question_id = tables.next_id();
            let mut options = Vec::with_capacity(new_question.options.len());
            for (order, new_option) in new_question.options.into_iter().enumerate() {
                options.push(AnswerOption {
                    id: tables.next_id(),
                    question_id,
                    option_text: new_option.option_text,
                    is_correct: new_option.is_correct,
                    option_order: order as i32 + 1,
                });
            }
            questions.push(Question {
                id: question_id,
                test_id,
                question_text: new_question.question_text,
                image_url: new_question.image_url,
                question_order: index as i32 + 1,
                points: new_question.points,
                options,
            });
        }

        let test = Test {
            id: test_id,
            title: new_test.title,
            description: new_test.description,
            exam_standard: new_test.exam_standard,
            difficulty: new_test.difficulty,
            time_limit_minutes: new_test.time_limit_minutes,
            passing_score: new_test.passing_score,
            published: new_test.published,
            created_by: new_test.created_by,
            created_at: now,
            updated_at: now,
            questions,
        };
        tables.tests.insert(test_id, test.clone());
        Ok(test)
    }

    async fn set_published(&self, test_id: i64, published: bool) -> CoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.tests.get_mut(&test_id) {
            Some(test) => {
                test.published = published;
                test.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_test(
        &self,
        test_id: i64,
        update: &UpdateTestRequest,
    ) -> CoreResult<Option<Test>> {
        let mut tables = self.tables.write().await;
        let Some(test) = tables.tests.get_mut(&test_id) else {
            return Ok(None);
        };
        test.title = update.title.clone();
        test.description = update.description.clone();
        test.exam_standard = update.exam_standard.clone();
        test.difficulty = update.difficulty.clone();
        test.time_limit_minutes = update.time_limit_minutes;
        test.passing_score = update.passing_score;
        test.updated_at = Utc::now();
        Ok(Some(test.clone()))
    }

    async fn delete_test(&self, test_id: i64) -> CoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.tests.remove(&test_id).is_none() {
            return Ok(false);
        }

        let removed: BTreeSet<i64> = tables
            .attempts
            .values()
            .filter(|a| a.test_id == test_id)
            .map(|a| a.id)
            .collect();
        tables.attempts.retain(|id, _| !removed.contains(id));
        tables
            .answers
            .retain(|(attempt_id, _), _| !removed.contains(attempt_id));
        Ok(true)
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn create_attempt(
        &self,
        user_id: i64,
        test_id: i64,
        started_at: DateTime<Utc>,
    ) -> CoreResult<TestAttempt> {
        let mut tables = self.tables.write().await;
        if !tables.tests.contains_key(&test_id) {
            return Err(CoreError::NotFound(format!("test {}", test_id)));
        }

        let attempt = TestAttempt {
            id: tables.next_id(),
            user_id,
            test_id,
            started_at,
            completed_at: None,
            score: None,
            total_points: None,
            time_taken_seconds: None,
            status: AttemptStatus::InProgress,
            created_at: Utc::now(),
        };
        tables.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, attempt_id: i64) -> CoreResult<Option<TestAttempt>> {
        let tables = self.tables.read().await;
        Ok(tables.attempts.get(&attempt_id).cloned())
    }

    async fn complete_attempt(
        &self,
        attempt_id: i64,
        record: &CompletionRecord,
    ) -> CoreResult<TestAttempt> {
        self.delay_write().await;
        let attempt = self.tables.write().await.transition(attempt_id, "complete", |attempt| {
            attempt.status = AttemptStatus::Completed;
            attempt.completed_at = Some(record.completed_at);
            attempt.score = Some(record.score);
            attempt.total_points = Some(record.total_points);
            attempt.time_taken_seconds = Some(record.time_taken_seconds);
        })?;
        self.delay_reply().await;
        Ok(attempt)
    }

    async fn abandon_attempt(&self, attempt_id: i64) -> CoreResult<TestAttempt> {
        self.delay_write().await;
        let attempt = self.tables.write().await.transition(attempt_id, "abandon", |attempt| {
            attempt.status = AttemptStatus::Abandoned;
        })?;
        self.delay_reply().await;
        Ok(attempt)
    }

    async fn list_user_attempts(&self, user_id: i64, limit: i64) -> CoreResult<Vec<AttemptSummary>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<AttemptSummary> = tables
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| tables.summary(a))
            .collect();
        sort_by_activity(&mut rows);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn search_attempts(
        &self,
        params: &AttemptSearchParams,
    ) -> CoreResult<Vec<AttemptSummary>> {
        let title = params
            .test_title
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());

        let tables = self.tables.read().await;
        let mut rows: Vec<AttemptSummary> = tables
            .attempts
            .values()
            .filter_map(|a| tables.summary(a))
            .filter(|s| params.user_id.is_none_or(|id| s.user_id == id))
            .filter(|s| params.test_id.is_none_or(|id| s.test_id == id))
            .filter(|s| params.status.is_none_or(|status| s.status == status))
            .filter(|s| {
                title
                    .as_deref()
                    .is_none_or(|t| s.test_title.to_lowercase().contains(t))
            })
            .filter(|s| {
                let at = s.completed_at.unwrap_or(s.started_at);
                params.date_from.is_none_or(|from| at >= from)
                    && params.date_to.is_none_or(|to| at <= to)
            })
            .filter(|s| {
                params
                    .score_min
                    .is_none_or(|min| s.score.is_some_and(|score| score >= min))
            })
            .filter(|s| {
                params
                    .score_max
                    .is_none_or(|max| s.score.is_some_and(|score| score <= max))
            })
            .collect();

        sort_by_activity(&mut rows);
        rows.truncate(params.effective_limit() as usize);
        Ok(rows)
    }
}

#[async_trait]
impl AnswerRepository for MemoryStore {
    async fn upsert_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        option_id: i64,
        is_correct: bool,
    ) -> CoreResult<StudentAnswer> {
        let mut tables = self.tables.write().await;
        if !tables.attempts.contains_key(&attempt_id) {
            return Err(CoreError::NotFound(format!("attempt {}", attempt_id)));
        }

        let id = match tables.answers.get(&(attempt_id, question_id)) {
            Some(existing) => existing.id,
            None => tables.next_id(),
        };
        let answer = StudentAnswer {
            id,
            attempt_id,
            question_id,
            selected_option_id: Some(option_id),
            is_correct: Some(is_correct),
            answered_at: Utc::now(),
        };
        tables
            .answers
            .insert((attempt_id, question_id), answer.clone());
        Ok(answer)
    }

    async fn list_answers(&self, attempt_id: i64) -> CoreResult<Vec<StudentAnswer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .answers
            .range((attempt_id, i64::MIN)..=(attempt_id, i64::MAX))
            .map(|(_, answer)| answer.clone())
            .collect())
    }
}

#[async_trait]
impl StatsRepository for MemoryStore {
    async fn get_stats(&self, user_id: i64) -> CoreResult<Option<UserStats>> {
        let tables = self.tables.read().await;
        Ok(tables.stats.get(&user_id).cloned())
    }

    async fn record_completion(
        &self,
        user_id: i64,
        score: i32,
        passed: bool,
    ) -> CoreResult<UserStats> {
        self.check_stats_writable()?;
        let mut tables = self.tables.write().await;
        let streak = StreakStats::from_dates(&tables.completion_dates(user_id));

        let stats = tables
            .stats
            .entry(user_id)
            .or_insert_with(|| UserStats::zeroed(user_id));
        stats.apply_completion(score, passed);
        stats.set_streak(streak);
        stats.updated_at = Utc::now();
        Ok(stats.clone())
    }

    async fn save_stats(&self, stats: &UserStats) -> CoreResult<()> {
        self.check_stats_writable()?;
        let mut tables = self.tables.write().await;
        let mut row = stats.clone();
        row.updated_at = Utc::now();
        tables.stats.insert(stats.user_id, row);
        Ok(())
    }

    async fn list_completion_dates(&self, user_id: i64) -> CoreResult<Vec<NaiveDate>> {
        Ok(self.tables.read().await.completion_dates(user_id))
    }

    async fn list_recent_completed(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> CoreResult<Vec<RecentScore>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&TestAttempt> = tables
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.status == AttemptStatus::Completed)
            .filter(|a| a.score.is_some() && a.total_points.is_some_and(|t| t > 0))
            .collect();
        rows.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .filter_map(|a| {
                Some(RecentScore {
                    score: a.score?,
                    total_points: a.total_points?,
                })
            })
            .collect())
    }

    async fn list_completed_outcomes(&self, user_id: i64) -> CoreResult<Vec<CompletedOutcome>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<CompletedOutcome> = tables
            .attempts
            .values()
            .filter(|a| a.user_id == user_id && a.status == AttemptStatus::Completed)
            .filter_map(|a| {
                let test = tables.tests.get(&a.test_id)?;
                Some(CompletedOutcome {
                    attempt_id: a.id,
                    score: a.score?,
                    total_points: a.total_points?,
                    passing_score: test.passing_score,
                    completed_at: a.completed_at?,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.completed_at
                .cmp(&b.completed_at)
                .then(a.attempt_id.cmp(&b.attempt_id))
        });
        Ok(rows)
    }
}
