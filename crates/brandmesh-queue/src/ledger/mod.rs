//! Durable job storage behind the task queue.
//!
//! [`JobLedger`] is the seam between the queue facade and the broker. Two
//! implementations ship with the crate: [`InMemoryLedger`] for tests and
//! single-process runs, and [`RedisLedger`] for durable deployments.

mod memory;
mod redis_backend;

pub use self::memory::InMemoryLedger;
pub use self::redis_backend::RedisLedger;

use crate::types::{JobRecord, JobState, LedgerCounts, NewJob, TaskType};
use async_trait::async_trait;
use brandmesh_core::BrandmeshResult;
use serde_json::Value;
use std::sync::Arc;

/// Result of [`JobLedger::remove_pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The job was waiting or delayed and is gone.
    Removed,
    /// The job exists but is past the pending stage.
    NotPending(JobState),
    /// No such job.
    NotFound,
}

/// Result of [`JobLedger::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Attempts remain; the job is claimable again at `ready_at`.
    Retrying {
        /// Attempts used so far.
        attempts_made: u32,
        /// Unix millis of the next claim window.
        ready_at: i64,
    },
    /// Out of attempts.
    Failed,
}

/// Persistent, priority-aware store of job records.
///
/// Every state transition is atomic with respect to other handles on the
/// same ledger, so a job is never claimed twice and a claimed job can never
/// be removed by a cancellation.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Queue name this ledger serves.
    fn name(&self) -> &str;

    /// Store a new job. Fails if the id is already taken.
    async fn add(&self, job: NewJob) -> BrandmeshResult<JobRecord>;

    /// Look up a job. `None` if it never existed or was evicted.
    async fn get(&self, id: &str) -> BrandmeshResult<Option<JobRecord>>;

    /// Remove a job only if it is still waiting or delayed.
    async fn remove_pending(&self, id: &str) -> BrandmeshResult<RemoveOutcome>;

    /// Claim the next job of `task_type`: due delayed and retrying jobs are
    /// promoted first, then the highest priority, earliest submitted waiting
    /// job becomes active.
    async fn claim(&self, task_type: TaskType) -> BrandmeshResult<Option<JobRecord>>;

    /// Mark an active job completed with its return value.
    async fn complete(&self, id: &str, value: Value) -> BrandmeshResult<()>;

    /// Record a failed attempt of an active job.
    async fn fail(&self, id: &str, reason: &str) -> BrandmeshResult<FailOutcome>;

    /// Jobs per state.
    async fn counts(&self) -> BrandmeshResult<LedgerCounts>;

    /// Another handle on the same ledger with its own connection.
    async fn duplicate(&self) -> BrandmeshResult<Arc<dyn JobLedger>>;

    /// Close this handle. Later calls on it fail.
    async fn close(&self) -> BrandmeshResult<()>;

    /// Tear down the underlying transport shared by all handles.
    async fn disconnect(&self) -> BrandmeshResult<()>;
}
