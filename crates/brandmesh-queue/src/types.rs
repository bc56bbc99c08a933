use brandmesh_core::BrandmeshError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of asynchronous work. Decides which worker may claim a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Produce brand copy or other generated content.
    ContentGeneration,
    /// Check content against a brand context.
    ContextValidation,
    /// Asset bookkeeping.
    AssetManagement,
    /// Analytics aggregation.
    AnalyticsProcessing,
    /// Multi-step workflow run by the workflow processor.
    WorkflowExecution,
    /// Messages passed between agents.
    AgentCommunication,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [TaskType; 6] = [
        TaskType::ContentGeneration,
        TaskType::ContextValidation,
        TaskType::AssetManagement,
        TaskType::AnalyticsProcessing,
        TaskType::WorkflowExecution,
        TaskType::AgentCommunication,
    ];

    /// Wire name, also used as the job id prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ContentGeneration => "content_generation",
            TaskType::ContextValidation => "context_validation",
            TaskType::AssetManagement => "asset_management",
            TaskType::AnalyticsProcessing => "analytics_processing",
            TaskType::WorkflowExecution => "workflow_execution",
            TaskType::AgentCommunication => "agent_communication",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = BrandmeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BrandmeshError::Validation(format!("Unknown task type: {s}")))
    }
}

/// Named priority levels. Higher values are claimed first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// 1
    Low,
    /// 5
    #[default]
    Medium,
    /// 10
    High,
    /// 20
    Critical,
}

impl TaskPriority {
    /// Numeric priority stored on the job.
    pub fn value(self) -> i64 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Medium => 5,
            TaskPriority::High => 10,
            TaskPriority::Critical => 20,
        }
    }
}

/// Public lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting or delayed.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Finished with a return value.
    Completed,
    /// Out of attempts.
    Failed,
    /// Failed an attempt and waiting for its backoff to elapse.
    Retrying,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        };
        f.write_str(s)
    }
}

/// Caller-supplied description of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    /// Which worker handles the task.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    /// Opaque task-specific payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Brand tag passed through to the processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_context: Option<String>,
    /// Execution timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Declared dependencies. Recorded, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
}

impl TaskData {
    /// Task of the given type with an empty payload.
    pub fn new(task_type: TaskType) -> Self {
        Self {
            task_type,
            payload: Map::new(),
            brand_context: None,
            timeout: None,
            depends_on: None,
        }
    }

    /// Replace the payload.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Set the brand context tag.
    pub fn with_brand_context(mut self, brand: impl Into<String>) -> Self {
        self.brand_context = Some(brand.into());
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}

/// Outcome of a result lookup for a job that exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// True only for completed jobs.
    pub success: bool,
    /// Processor return value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Why there is no data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    /// A completed job's return value.
    pub fn completed(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A job that exists but has not completed.
    pub fn not_completed(state: &JobState) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(format!("Job is not completed. Current state: {state}")),
        }
    }
}

/// Broker-level state of a job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    /// Claimable now.
    Waiting,
    /// Not claimable until its ready time.
    Delayed,
    /// Claimed by a worker.
    Active,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
    /// Backing off before another attempt.
    Retrying,
    /// Any state name this crate does not know.
    Unknown(String),
}

impl JobState {
    /// Broker name of the state.
    pub fn as_str(&self) -> &str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Retrying => "retrying",
            JobState::Unknown(name) => name,
        }
    }

    /// Public status, or `None` for unknown states.
    pub fn task_status(&self) -> Option<TaskStatus> {
        match self {
            JobState::Waiting | JobState::Delayed => Some(TaskStatus::Pending),
            JobState::Active => Some(TaskStatus::Processing),
            JobState::Completed => Some(TaskStatus::Completed),
            JobState::Failed => Some(TaskStatus::Failed),
            JobState::Retrying => Some(TaskStatus::Retrying),
            JobState::Unknown(_) => None,
        }
    }

    /// Waiting or delayed: the only states a job can be cancelled from.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobState {
    fn from(s: &str) -> Self {
        match s {
            "waiting" => JobState::Waiting,
            "delayed" => JobState::Delayed,
            "active" => JobState::Active,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            "retrying" => JobState::Retrying,
            other => JobState::Unknown(other.to_string()),
        }
    }
}

impl From<String> for JobState {
    fn from(s: String) -> Self {
        JobState::from(s.as_str())
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

/// Highest priority the ledger stores; larger values are clamped.
pub const MAX_PRIORITY: i64 = 2_097_151;

/// Per-job scheduling options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Clamped to `0..=MAX_PRIORITY`.
    pub priority: i64,
    /// Milliseconds before the job becomes claimable.
    pub delay: u64,
    /// Execution timeout in milliseconds.
    pub timeout: u64,
    /// Total attempts including the first.
    pub attempts: u32,
    /// Base of the exponential backoff in milliseconds.
    pub backoff: u64,
}

impl JobOptions {
    /// Clamp priority into the stored range.
    pub fn normalized(mut self) -> Self {
        self.priority = self.priority.clamp(0, MAX_PRIORITY);
        self.attempts = self.attempts.max(1);
        self
    }

    /// Delay before the next attempt once `attempts_made` attempts have failed.
    pub fn backoff_delay(&self, attempts_made: u32) -> u64 {
        let exponent = attempts_made.saturating_sub(1).min(32);
        self.backoff.saturating_mul(1u64 << exponent)
    }
}

/// A job as handed to [`JobLedger::add`](crate::ledger::JobLedger::add).
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Caller-generated unique id.
    pub id: String,
    /// Task description.
    pub data: TaskData,
    /// Scheduling options.
    pub opts: JobOptions,
}

/// A job as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique id.
    pub id: String,
    /// Task description.
    pub data: TaskData,
    /// Scheduling options.
    pub opts: JobOptions,
    /// Current broker state.
    pub state: JobState,
    /// Number of times the job has been claimed.
    pub attempts_made: u32,
    /// Submission sequence, breaks priority ties.
    pub seq: u64,
    /// Submission time, unix millis.
    pub timestamp: i64,
    /// Earliest claim time, unix millis.
    pub ready_at: i64,
    /// Last claim time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_on: Option<i64>,
    /// Terminal transition time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_on: Option<i64>,
    /// Processor return value for completed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returnvalue: Option<Value>,
    /// Reason of the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl JobRecord {
    /// Build the stored form of a new job.
    pub fn from_new(job: NewJob, seq: u64, now: i64) -> Self {
        let opts = job.opts.normalized();
        let delay = i64::try_from(opts.delay).unwrap_or(i64::MAX);
        let state = if opts.delay > 0 {
            JobState::Delayed
        } else {
            JobState::Waiting
        };
        Self {
            id: job.id,
            data: job.data,
            ready_at: now.saturating_add(delay),
            opts,
            state,
            attempts_made: 0,
            seq,
            timestamp: now,
            processed_on: None,
            finished_on: None,
            returnvalue: None,
            failed_reason: None,
        }
    }

    /// Shortcut for `data.task_type`.
    pub fn task_type(&self) -> TaskType {
        self.data.task_type
    }
}

/// Number of jobs per ledger state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    /// Claimable now.
    pub waiting: u64,
    /// Waiting for their delay.
    pub delayed: u64,
    /// Claimed.
    pub active: u64,
    /// Retained completed jobs.
    pub completed: u64,
    /// Retained failed jobs.
    pub failed: u64,
    /// Backing off.
    pub retrying: u64,
}

/// How many terminal jobs the ledger keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Completed jobs kept, newest first.
    pub keep_completed: usize,
    /// Failed jobs kept, newest first.
    pub keep_failed: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_completed: 100,
            keep_failed: 200,
        }
    }
}
