// src/repositories/mod.rs

pub mod attempt_repository;
pub mod memory;
pub mod stats_repository;
pub mod test_repository;

pub use attempt_repository::{AnswerRepository, AttemptRepository, PgAttemptRepository};
pub use memory::MemoryStore;
pub use stats_repository::{PgStatsRepository, StatsRepository};
pub use test_repository::{PgTestRepository, TestRepository};
