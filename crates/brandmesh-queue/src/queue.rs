use crate::ledger::{JobLedger, RemoveOutcome};
use crate::types::{
    JobOptions, JobState, LedgerCounts, NewJob, TaskData, TaskPriority, TaskResult, TaskStatus,
    TaskType,
};
use crate::worker::{TaskProcessor, Worker, WorkerOptions};
use brandmesh_core::{generate_id, BrandmeshError, BrandmeshResult};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Defaults applied to every job and worker created by a [`TaskQueueSystem`].
#[derive(Debug, Clone, Copy)]
pub struct QueueDefaults {
    /// Total attempts per job.
    pub attempts: u32,
    /// Exponential backoff base in milliseconds.
    pub backoff_ms: u64,
    /// Job timeout when the task does not set one.
    pub timeout_ms: u64,
    /// Worker sleep between empty claims.
    pub poll_interval: Duration,
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
            timeout_ms: 60_000,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Snapshot returned by [`TaskQueueSystem::queue_stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Queue name.
    pub queue: String,
    /// Jobs per ledger state.
    #[serde(flatten)]
    pub counts: LedgerCounts,
    /// Task types with a registered worker.
    pub workers: Vec<TaskType>,
}

/// Public face of the task queue: submit, inspect, cancel, consume, shut down.
pub struct TaskQueueSystem {
    ledger: Arc<dyn JobLedger>,
    defaults: QueueDefaults,
    workers: Mutex<Vec<Worker>>,
}

impl TaskQueueSystem {
    /// Queue over `ledger` with default job options.
    pub fn new(ledger: Arc<dyn JobLedger>) -> Self {
        Self::with_defaults(ledger, QueueDefaults::default())
    }

    /// Queue over `ledger` with explicit job options.
    pub fn with_defaults(ledger: Arc<dyn JobLedger>, defaults: QueueDefaults) -> Self {
        Self {
            ledger,
            defaults,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Queue name of the underlying ledger.
    pub fn name(&self) -> &str {
        self.ledger.name()
    }

    /// Enqueue a task and return its id without waiting for execution.
    pub async fn add_task(
        &self,
        data: TaskData,
        priority: TaskPriority,
        delay_ms: u64,
    ) -> BrandmeshResult<String> {
        let id = generate_id(data.task_type.as_str());
        let task_type = data.task_type;
        let opts = JobOptions {
            priority: priority.value(),
            delay: delay_ms,
            timeout: data.timeout.unwrap_or(self.defaults.timeout_ms),
            attempts: self.defaults.attempts,
            backoff: self.defaults.backoff_ms,
        };
        self.ledger
            .add(NewJob {
                id: id.clone(),
                data,
                opts,
            })
            .await?;
        info!(job_id = %id, task_type = %task_type, priority = ?priority, delay_ms, "Task added to queue");
        Ok(id)
    }

    /// Public status of a job; `None` when it is unknown or evicted.
    pub async fn get_task_status(&self, id: &str) -> BrandmeshResult<Option<TaskStatus>> {
        Ok(self
            .ledger
            .get(id)
            .await?
            .and_then(|job| job.state.task_status()))
    }

    /// Result of a job; `None` when it is unknown or evicted.
    pub async fn get_task_result(&self, id: &str) -> BrandmeshResult<Option<TaskResult>> {
        let Some(job) = self.ledger.get(id).await? else {
            return Ok(None);
        };
        Ok(Some(match job.state {
            JobState::Completed => TaskResult::completed(job.returnvalue.unwrap_or(Value::Null)),
            ref state => TaskResult::not_completed(state),
        }))
    }

    /// Remove a job that has not been claimed yet. False otherwise.
    pub async fn cancel_task(&self, id: &str) -> BrandmeshResult<bool> {
        match self.ledger.remove_pending(id).await? {
            RemoveOutcome::Removed => {
                info!(job_id = %id, "Task cancelled");
                Ok(true)
            }
            RemoveOutcome::NotPending(state) => {
                info!(job_id = %id, state = %state, "Task not cancelled: already claimed");
                Ok(false)
            }
            RemoveOutcome::NotFound => Ok(false),
        }
    }

    /// Start a worker for `task_type`. One processor per type.
    pub async fn register_processor(
        &self,
        task_type: TaskType,
        processor: Arc<dyn TaskProcessor>,
        concurrency: usize,
    ) -> BrandmeshResult<()> {
        self.ensure_unregistered(task_type)?;
        let ledger = self.ledger.duplicate().await?;

        let options = WorkerOptions {
            concurrency,
            poll_interval: self.defaults.poll_interval,
        };
        {
            let mut workers = self.workers.lock();
            if !workers.iter().any(|w| w.task_type() == task_type) {
                workers.push(Worker::spawn(task_type, ledger, processor, options));
                return Ok(());
            }
        }
        // Lost a registration race; release the duplicated handle.
        ledger.close().await?;
        Err(Self::already_registered(task_type))
    }

    fn ensure_unregistered(&self, task_type: TaskType) -> BrandmeshResult<()> {
        if self
            .workers
            .lock()
            .iter()
            .any(|w| w.task_type() == task_type)
        {
            return Err(Self::already_registered(task_type));
        }
        Ok(())
    }

    fn already_registered(task_type: TaskType) -> BrandmeshError {
        BrandmeshError::Queue(format!(
            "A processor for {task_type} is already registered"
        ))
    }

    /// Task types that currently have a worker.
    pub fn registered_types(&self) -> Vec<TaskType> {
        self.workers.lock().iter().map(Worker::task_type).collect()
    }

    /// Ledger counts plus the registered workers.
    pub async fn queue_stats(&self) -> BrandmeshResult<QueueStats> {
        let counts = self.ledger.counts().await?;
        Ok(QueueStats {
            queue: self.name().to_string(),
            counts,
            workers: self.registered_types(),
        })
    }

    /// Close every worker, then the ledger handle, then the transport.
    ///
    /// Every step runs even if an earlier one fails; all failures are
    /// reported together.
    pub async fn shutdown(&self) -> BrandmeshResult<()> {
        let workers = std::mem::take(&mut *self.workers.lock());
        let mut failures = Vec::new();

        for worker in &workers {
            if let Err(e) = worker.close().await {
                error!(task_type = %worker.task_type(), error = %e, "Failed to close worker");
                failures.push(format!("worker {}: {e}", worker.task_type()));
            }
        }
        if let Err(e) = self.ledger.close().await {
            error!(error = %e, "Failed to close ledger");
            failures.push(format!("ledger: {e}"));
        }
        if let Err(e) = self.ledger.disconnect().await {
            error!(error = %e, "Failed to disconnect ledger transport");
            failures.push(format!("transport: {e}"));
        }

        if failures.is_empty() {
            info!(queue = %self.name(), "Task queue shut down");
            Ok(())
        } else {
            Err(BrandmeshError::Shutdown(failures.join("; ")))
        }
    }
}
