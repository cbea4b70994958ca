// src/services/mod.rs

use std::{future::Future, time::Duration};

use crate::error::{CoreError, CoreResult};

pub mod attempt_service;
pub mod grading;
pub mod stats_service;

pub use attempt_service::{AttemptService, CompletedAttempt};
pub use stats_service::StatsService;

/// Runs a core operation under a deadline.
///
/// On expiry the inner future is dropped. Work the backend already committed
/// (an autocommitted `UPDATE` whose reply was still in flight) stays
/// committed, so a caller that must observe such a write re-reads after
/// `DeadlineExceeded`.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::DeadlineExceeded),
    }
}
