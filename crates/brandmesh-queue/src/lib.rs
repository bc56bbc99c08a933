//! Priority job queue for the Brandmesh orchestration service.
//!
//! Jobs are stored in a [`JobLedger`], claimed by per-type [`Worker`]s and
//! exposed to callers through the [`TaskQueueSystem`] facade.
//!
//! # Main types
//!
//! - [`TaskQueueSystem`]: Submit, inspect, cancel and consume tasks.
//! - [`JobLedger`]: Durable job storage; [`InMemoryLedger`] and [`RedisLedger`].
//! - [`TaskProcessor`]: Work run for every claimed job of one type.

/// Job ledger trait and backends.
pub mod ledger;
/// Task queue facade.
pub mod queue;
/// Job and task types.
pub mod types;
/// Per-type job consumers.
pub mod worker;

pub use ledger::{FailOutcome, InMemoryLedger, JobLedger, RedisLedger, RemoveOutcome};
pub use queue::{QueueDefaults, QueueStats, TaskQueueSystem};
pub use types::{
    JobOptions, JobRecord, JobState, LedgerCounts, NewJob, RetentionPolicy, TaskData,
    TaskPriority, TaskResult, TaskStatus, TaskType, MAX_PRIORITY,
};
pub use worker::{processor_fn, FnProcessor, TaskProcessor, Worker, WorkerOptions};
