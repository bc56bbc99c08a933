use crate::ledger::{FailOutcome, JobLedger};
use crate::types::{JobRecord, TaskType};
use async_trait::async_trait;
use brandmesh_core::{BrandmeshError, BrandmeshResult};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Work performed for every claimed job of one task type.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Handle one job. The returned value becomes the job's result.
    async fn process(&self, job: &JobRecord) -> BrandmeshResult<Value>;
}

/// Adapter turning an async closure into a [`TaskProcessor`].
pub struct FnProcessor<F>(F);

#[async_trait]
impl<F, Fut> TaskProcessor for FnProcessor<F>
where
    F: Fn(JobRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BrandmeshResult<Value>> + Send + 'static,
{
    async fn process(&self, job: &JobRecord) -> BrandmeshResult<Value> {
        (self.0)(job.clone()).await
    }
}

/// Wrap an async closure as a shareable processor.
pub fn processor_fn<F, Fut>(f: F) -> Arc<dyn TaskProcessor>
where
    F: Fn(JobRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BrandmeshResult<Value>> + Send + 'static,
{
    Arc::new(FnProcessor(f))
}

/// Tuning for one worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Jobs processed at the same time.
    pub concurrency: usize,
    /// Sleep between claims when nothing is claimable.
    pub poll_interval: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A consumer bound to one task type, running on its own tokio task.
pub struct Worker {
    task_type: TaskType,
    ledger: Arc<dyn JobLedger>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Start polling `ledger` for jobs of `task_type`.
    ///
    /// `ledger` should be a duplicated handle; the worker closes it on
    /// [`Worker::close`].
    pub fn spawn(
        task_type: TaskType,
        ledger: Arc<dyn JobLedger>,
        processor: Arc<dyn TaskProcessor>,
        options: WorkerOptions,
    ) -> Self {
        let concurrency = options.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            task_type,
            Arc::clone(&ledger),
            processor,
            Arc::clone(&permits),
            options.poll_interval,
            shutdown_rx,
        ));
        info!(task_type = %task_type, concurrency, "Worker started");
        Self {
            task_type,
            ledger,
            permits,
            concurrency,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Task type this worker consumes.
    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Stop claiming, wait for in-flight jobs, then close the ledger handle.
    pub async fn close(&self) -> BrandmeshResult<()> {
        // The loop may already be gone; a send error only means that.
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                BrandmeshError::Queue(format!("Worker for {} stopped abnormally: {e}", self.task_type))
            })?;
        }

        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        let _drained = self.permits.acquire_many(all).await.map_err(|e| {
            BrandmeshError::Queue(format!("Worker for {} lost its permits: {e}", self.task_type))
        })?;
        self.ledger.close().await?;
        info!(task_type = %self.task_type, "Worker closed");
        Ok(())
    }
}

/// Wait for the poll interval or a shutdown signal. False means stop.
async fn idle(shutdown: &mut watch::Receiver<bool>, poll_interval: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => {
            if changed.is_err() {
                return false;
            }
        }
        () = tokio::time::sleep(poll_interval) => {}
    }
    !*shutdown.borrow()
}

async fn poll_loop(
    task_type: TaskType,
    ledger: Arc<dyn JobLedger>,
    processor: Arc<dyn TaskProcessor>,
    permits: Arc<Semaphore>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        match ledger.claim(task_type).await {
            Ok(Some(job)) => {
                let ledger = Arc::clone(&ledger);
                let processor = Arc::clone(&processor);
                tokio::spawn(async move {
                    let _permit = permit;
                    execute(task_type, ledger, processor, job).await;
                });
            }
            Ok(None) => {
                drop(permit);
                if !idle(&mut shutdown, poll_interval).await {
                    break;
                }
            }
            Err(e) => {
                drop(permit);
                warn!(task_type = %task_type, error = %e, "Failed to claim job");
                if !idle(&mut shutdown, poll_interval).await {
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Processor panicked: {detail}")
}

/// Run one claimed job and record the outcome. Never propagates failures.
async fn execute(
    task_type: TaskType,
    ledger: Arc<dyn JobLedger>,
    processor: Arc<dyn TaskProcessor>,
    job: JobRecord,
) {
    info!(
        job_id = %job.id,
        task_type = %task_type,
        attempt = job.attempts_made,
        "Processing job"
    );

    let outcome = if job.task_type() != task_type {
        Err(format!(
            "Worker for {task_type} received job of type {}",
            job.task_type()
        ))
    } else {
        let limit = Duration::from_millis(job.opts.timeout);
        let run = AssertUnwindSafe(processor.process(&job)).catch_unwind();
        match tokio::time::timeout(limit, run).await {
            Err(_) => Err(format!("Job timed out after {} ms", job.opts.timeout)),
            Ok(Err(panic)) => Err(panic_message(panic)),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    };

    match outcome {
        Ok(value) => match ledger.complete(&job.id, value).await {
            Ok(()) => info!(job_id = %job.id, task_type = %task_type, "Job completed"),
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to record job completion"),
        },
        Err(reason) => {
            error!(job_id = %job.id, task_type = %task_type, error = %reason, "Job failed");
            match ledger.fail(&job.id, &reason).await {
                Ok(FailOutcome::Retrying {
                    attempts_made,
                    ready_at,
                }) => warn!(
                    job_id = %job.id,
                    attempts_made,
                    ready_at,
                    "Job scheduled for retry"
                ),
                Ok(FailOutcome::Failed) => {
                    warn!(job_id = %job.id, "Job exhausted its attempts");
                }
                Err(e) => error!(job_id = %job.id, error = %e, "Failed to record job failure"),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use crate::types::{JobOptions, JobState, NewJob, RetentionPolicy, TaskData};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> WorkerOptions {
        WorkerOptions {
            concurrency: 1,
            poll_interval: Duration::from_millis(10),
        }
    }

    async fn wait_for_state(ledger: &dyn JobLedger, id: &str, state: JobState) -> JobRecord {
        for _ in 0..200 {
            if let Some(job) = ledger.get(id).await.unwrap() {
                if job.state == state {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never reached {state}");
    }

    fn job(id: &str, attempts: u32, timeout: u64) -> NewJob {
        NewJob {
            id: id.into(),
            data: TaskData::new(TaskType::ContentGeneration),
            opts: JobOptions {
                priority: 5,
                delay: 0,
                timeout,
                attempts,
                backoff: 0,
            },
        }
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(
            panic_message(Box::new("boom")),
            "Processor panicked: boom"
        );
        assert_eq!(
            panic_message(Box::new(String::from("bang"))),
            "Processor panicked: bang"
        );
        assert_eq!(panic_message(Box::new(7u8)), "Processor panicked: unknown panic");
    }

    #[tokio::test]
    async fn test_panicking_processor_fails_job() {
        let ledger = InMemoryLedger::new("w", RetentionPolicy::default());
        ledger.add(job("p", 1, 1_000)).await.unwrap();
        let processor = processor_fn(|_job| async move {
            if true {
                panic!("processor exploded");
            }
            Ok::<_, BrandmeshError>(Value::Null)
        });
        let worker = Worker::spawn(
            TaskType::ContentGeneration,
            ledger.duplicate().await.unwrap(),
            processor,
            fast(),
        );
        let failed = wait_for_state(&ledger, "p", JobState::Failed).await;
        assert_eq!(
            failed.failed_reason.as_deref(),
            Some("Processor panicked: processor exploded")
        );
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let ledger = InMemoryLedger::new("w", RetentionPolicy::default());
        ledger.add(job("slow", 2, 20)).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let processor = processor_fn(move |_job| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BrandmeshError>(Value::Null)
            }
        });
        let worker = Worker::spawn(
            TaskType::ContentGeneration,
            ledger.duplicate().await.unwrap(),
            processor,
            fast(),
        );
        let failed = wait_for_state(&ledger, "slow", JobState::Failed).await;
        assert_eq!(failed.attempts_made, 2);
        assert_eq!(
            failed.failed_reason.as_deref(),
            Some("Job timed out after 20 ms")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        worker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_job() {
        let ledger = InMemoryLedger::new("w", RetentionPolicy::default());
        ledger.add(job("long", 1, 5_000)).await.unwrap();
        let processor = processor_fn(|_job| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, BrandmeshError>(Value::from("done"))
        });
        let worker = Worker::spawn(
            TaskType::ContentGeneration,
            ledger.duplicate().await.unwrap(),
            processor,
            fast(),
        );
        wait_for_state(&ledger, "long", JobState::Active).await;
        worker.close().await.unwrap();

        let job = ledger.get("long").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.returnvalue, Some(Value::from("done")));
    }
}
