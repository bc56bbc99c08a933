use super::{FailOutcome, JobLedger, RemoveOutcome};
use crate::types::{JobRecord, JobState, LedgerCounts, NewJob, RetentionPolicy, TaskType};
use async_trait::async_trait;
use brandmesh_core::{now_millis, BrandmeshError, BrandmeshResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordering key of a claimable job: highest priority, then earliest submission.
type WaitKey = (Reverse<i64>, u64);

#[derive(Default)]
struct LedgerState {
    jobs: HashMap<String, JobRecord>,
    waiting: HashMap<TaskType, BTreeMap<WaitKey, String>>,
    /// Delayed and retrying jobs, keyed by ready time.
    scheduled: HashMap<TaskType, BTreeMap<(i64, u64), String>>,
    active: HashSet<String>,
    completed: VecDeque<String>,
    failed: VecDeque<String>,
    next_seq: u64,
}

impl LedgerState {
    fn enqueue_waiting(&mut self, job: &JobRecord) {
        self.waiting
            .entry(job.task_type())
            .or_default()
            .insert((Reverse(job.opts.priority), job.seq), job.id.clone());
    }

    fn schedule(&mut self, job: &JobRecord) {
        self.scheduled
            .entry(job.task_type())
            .or_default()
            .insert((job.ready_at, job.seq), job.id.clone());
    }

    fn promote_due(&mut self, task_type: TaskType, now: i64) {
        let Some(scheduled) = self.scheduled.get_mut(&task_type) else {
            return;
        };
        let later = scheduled.split_off(&(now.saturating_add(1), 0));
        let due = std::mem::replace(scheduled, later);
        for id in due.into_values() {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                let job = job.clone();
                self.enqueue_waiting(&job);
            }
        }
    }

    fn evict(&mut self, retention: RetentionPolicy) {
        while self.completed.len() > retention.keep_completed {
            if let Some(id) = self.completed.pop_front() {
                self.jobs.remove(&id);
            }
        }
        while self.failed.len() > retention.keep_failed {
            if let Some(id) = self.failed.pop_front() {
                self.jobs.remove(&id);
            }
        }
    }

    fn take_active(&mut self, id: &str) -> BrandmeshResult<&mut JobRecord> {
        if !self.active.remove(id) {
            return Err(BrandmeshError::Ledger(format!("Job {id} is not active")));
        }
        self.jobs
            .get_mut(id)
            .ok_or_else(|| BrandmeshError::Ledger(format!("Job {id} is not active")))
    }
}

struct Shared {
    state: Mutex<LedgerState>,
    disconnected: AtomicBool,
}

/// Process-local ledger. Handles created with `duplicate` share storage.
pub struct InMemoryLedger {
    name: String,
    retention: RetentionPolicy,
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl InMemoryLedger {
    /// Empty ledger for the named queue.
    pub fn new(name: impl Into<String>, retention: RetentionPolicy) -> Self {
        Self {
            name: name.into(),
            retention,
            shared: Arc::new(Shared {
                state: Mutex::new(LedgerState::default()),
                disconnected: AtomicBool::new(false),
            }),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> BrandmeshResult<()> {
        if self.closed.load(Ordering::SeqCst) || self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(BrandmeshError::Ledger(format!(
                "Ledger {} is closed",
                self.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl JobLedger for InMemoryLedger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, job: NewJob) -> BrandmeshResult<JobRecord> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        if state.jobs.contains_key(&job.id) {
            return Err(BrandmeshError::Queue(format!(
                "Job {} already exists",
                job.id
            )));
        }
        state.next_seq += 1;
        let record = JobRecord::from_new(job, state.next_seq, now_millis());
        if record.state == JobState::Delayed {
            state.schedule(&record);
        } else {
            state.enqueue_waiting(&record);
        }
        state.jobs.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> BrandmeshResult<Option<JobRecord>> {
        self.ensure_open()?;
        Ok(self.shared.state.lock().jobs.get(id).cloned())
    }

    async fn remove_pending(&self, id: &str) -> BrandmeshResult<RemoveOutcome> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        let Some(job) = state.jobs.get(id) else {
            return Ok(RemoveOutcome::NotFound);
        };
        if !job.state.is_pending() {
            return Ok(RemoveOutcome::NotPending(job.state.clone()));
        }
        let task_type = job.task_type();
        let wait_key = (Reverse(job.opts.priority), job.seq);
        let schedule_key = (job.ready_at, job.seq);
        if let Some(waiting) = state.waiting.get_mut(&task_type) {
            waiting.remove(&wait_key);
        }
        if let Some(scheduled) = state.scheduled.get_mut(&task_type) {
            scheduled.remove(&schedule_key);
        }
        state.jobs.remove(id);
        Ok(RemoveOutcome::Removed)
    }

    async fn claim(&self, task_type: TaskType) -> BrandmeshResult<Option<JobRecord>> {
        self.ensure_open()?;
        let now = now_millis();
        let mut state = self.shared.state.lock();
        state.promote_due(task_type, now);

        let next = state
            .waiting
            .get_mut(&task_type)
            .and_then(BTreeMap::pop_first)
            .map(|(_, id)| id);
        let Some(id) = next else {
            return Ok(None);
        };
        state.active.insert(id.clone());
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| BrandmeshError::Ledger(format!("Job {id} vanished while waiting")))?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        job.processed_on = Some(now);
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: &str, value: Value) -> BrandmeshResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        let job = state.take_active(id)?;
        job.state = JobState::Completed;
        job.finished_on = Some(now_millis());
        job.returnvalue = Some(value);
        state.completed.push_back(id.to_string());
        state.evict(self.retention);
        Ok(())
    }

    async fn fail(&self, id: &str, reason: &str) -> BrandmeshResult<FailOutcome> {
        self.ensure_open()?;
        let now = now_millis();
        let mut state = self.shared.state.lock();
        let job = state.take_active(id)?;
        job.failed_reason = Some(reason.to_string());

        if job.attempts_made < job.opts.attempts {
            let delay = job.opts.backoff_delay(job.attempts_made);
            job.state = JobState::Retrying;
            job.ready_at = now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));
            let outcome = FailOutcome::Retrying {
                attempts_made: job.attempts_made,
                ready_at: job.ready_at,
            };
            let job = job.clone();
            state.schedule(&job);
            return Ok(outcome);
        }

        job.state = JobState::Failed;
        job.finished_on = Some(now);
        state.failed.push_back(id.to_string());
        state.evict(self.retention);
        Ok(FailOutcome::Failed)
    }

    async fn counts(&self) -> BrandmeshResult<LedgerCounts> {
        self.ensure_open()?;
        let state = self.shared.state.lock();
        let mut counts = LedgerCounts::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Retrying => counts.retrying += 1,
                JobState::Unknown(_) => {}
            }
        }
        Ok(counts)
    }

    async fn duplicate(&self) -> BrandmeshResult<Arc<dyn JobLedger>> {
        self.ensure_open()?;
        Ok(Arc::new(InMemoryLedger {
            name: self.name.clone(),
            retention: self.retention,
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> BrandmeshResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> BrandmeshResult<()> {
        self.shared.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{JobOptions, TaskData};

    fn opts(priority: i64) -> JobOptions {
        JobOptions {
            priority,
            delay: 0,
            timeout: 60_000,
            attempts: 3,
            backoff: 1000,
        }
    }

    fn new_job(id: &str, task_type: TaskType, opts: JobOptions) -> NewJob {
        NewJob {
            id: id.to_string(),
            data: TaskData::new(task_type),
            opts,
        }
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new("test", RetentionPolicy::default())
    }

    #[tokio::test]
    async fn test_claim_order_priority_then_fifo() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger.add(new_job("low", t, opts(1))).await.unwrap();
        ledger.add(new_job("crit", t, opts(20))).await.unwrap();
        ledger.add(new_job("med-1", t, opts(5))).await.unwrap();
        ledger.add(new_job("med-2", t, opts(5))).await.unwrap();

        let mut order = Vec::new();
        while let Some(job) = ledger.claim(t).await.unwrap() {
            order.push(job.id);
        }
        assert_eq!(order, vec!["crit", "med-1", "med-2", "low"]);
    }

    #[tokio::test]
    async fn test_claim_is_scoped_to_type() {
        let ledger = ledger();
        ledger
            .add(new_job("a", TaskType::AnalyticsProcessing, opts(5)))
            .await
            .unwrap();
        assert!(ledger
            .claim(TaskType::ContentGeneration)
            .await
            .unwrap()
            .is_none());
        let job = ledger
            .claim(TaskType::AnalyticsProcessing)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_delayed_job_not_claimable_early() {
        let ledger = ledger();
        let t = TaskType::AssetManagement;
        let record = ledger
            .add(new_job("later", t, JobOptions { delay: 60_000, ..opts(5) }))
            .await
            .unwrap();
        assert_eq!(record.state, JobState::Delayed);
        assert!(ledger.claim(t).await.unwrap().is_none());
        assert_eq!(
            ledger.get("later").await.unwrap().unwrap().state,
            JobState::Delayed
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger.add(new_job("same", t, opts(5))).await.unwrap();
        let err = ledger.add(new_job("same", t, opts(5))).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_fail_retries_then_fails() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger
            .add(new_job(
                "flaky",
                t,
                JobOptions {
                    attempts: 2,
                    backoff: 0,
                    ..opts(5)
                },
            ))
            .await
            .unwrap();

        ledger.claim(t).await.unwrap().unwrap();
        let outcome = ledger.fail("flaky", "boom").await.unwrap();
        assert!(matches!(
            outcome,
            FailOutcome::Retrying { attempts_made: 1, .. }
        ));
        let job = ledger.get("flaky").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Retrying);
        assert_eq!(job.failed_reason.as_deref(), Some("boom"));

        let job = ledger.claim(t).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 2);
        assert_eq!(
            ledger.fail("flaky", "boom again").await.unwrap(),
            FailOutcome::Failed
        );
        let job = ledger.get("flaky").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.finished_on.is_some());
    }

    #[tokio::test]
    async fn test_retry_waits_for_backoff() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger.add(new_job("slow", t, opts(5))).await.unwrap();
        ledger.claim(t).await.unwrap().unwrap();
        let outcome = ledger.fail("slow", "x").await.unwrap();
        let FailOutcome::Retrying { ready_at, .. } = outcome else {
            panic!("expected retry");
        };
        assert!(ready_at >= now_millis() + 900);
        assert!(ledger.claim(t).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_pending_only() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger.add(new_job("a", t, opts(5))).await.unwrap();
        ledger.add(new_job("b", t, opts(5))).await.unwrap();

        assert_eq!(ledger.remove_pending("a").await.unwrap(), RemoveOutcome::Removed);
        assert!(ledger.get("a").await.unwrap().is_none());
        assert_eq!(
            ledger.remove_pending("a").await.unwrap(),
            RemoveOutcome::NotFound
        );

        let claimed = ledger.claim(t).await.unwrap().unwrap();
        assert_eq!(claimed.id, "b");
        assert_eq!(
            ledger.remove_pending("b").await.unwrap(),
            RemoveOutcome::NotPending(JobState::Active)
        );
        assert!(ledger.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retention_evicts_oldest() {
        let ledger = InMemoryLedger::new(
            "test",
            RetentionPolicy {
                keep_completed: 2,
                keep_failed: 1,
            },
        );
        let t = TaskType::AnalyticsProcessing;
        for i in 0..3 {
            let id = format!("ok-{i}");
            ledger.add(new_job(&id, t, opts(5))).await.unwrap();
            ledger.claim(t).await.unwrap().unwrap();
            ledger.complete(&id, Value::from(i)).await.unwrap();
        }
        for i in 0..2 {
            let id = format!("bad-{i}");
            ledger
                .add(new_job(&id, t, JobOptions { attempts: 1, ..opts(5) }))
                .await
                .unwrap();
            ledger.claim(t).await.unwrap().unwrap();
            ledger.fail(&id, "nope").await.unwrap();
        }

        assert!(ledger.get("ok-0").await.unwrap().is_none());
        assert!(ledger.get("ok-1").await.unwrap().is_some());
        assert!(ledger.get("ok-2").await.unwrap().is_some());
        assert!(ledger.get("bad-0").await.unwrap().is_none());
        assert!(ledger.get("bad-1").await.unwrap().is_some());

        let counts = ledger.counts().await.unwrap();
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.failed, 1);
    }

    #[tokio::test]
    async fn test_complete_requires_active() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        ledger.add(new_job("a", t, opts(5))).await.unwrap();
        assert!(ledger.complete("a", Value::Null).await.is_err());
        assert!(ledger.fail("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_shares_storage_but_not_close() {
        let ledger = ledger();
        let t = TaskType::ContentGeneration;
        let dup = ledger.duplicate().await.unwrap();
        ledger.add(new_job("a", t, opts(5))).await.unwrap();
        assert_eq!(dup.claim(t).await.unwrap().unwrap().id, "a");

        dup.close().await.unwrap();
        assert!(dup.counts().await.is_err());
        assert_eq!(ledger.counts().await.unwrap().active, 1);

        ledger.disconnect().await.unwrap();
        assert!(ledger.get("a").await.is_err());
    }
}
