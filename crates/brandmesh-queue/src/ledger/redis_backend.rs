use super::{FailOutcome, JobLedger, RemoveOutcome};
use crate::types::{
    JobOptions, JobRecord, JobState, LedgerCounts, NewJob, RetentionPolicy, TaskData, TaskType,
};
use async_trait::async_trait;
use brandmesh_core::{now_millis, BrandmeshError, BrandmeshResult};
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Store the job hash and index it, unless the id is taken.
const ADD_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
for i = 3, #ARGV, 2 do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
end
redis.call('ZADD', KEYS[2], ARGV[1], ARGV[2])
return 1
";

/// Promote due delayed/retrying jobs of one type, then pop the best waiting one.
const CLAIM_SCRIPT: &str = r"
for k = 2, 3 do
  local due = redis.call('ZRANGEBYSCORE', KEYS[k], '-inf', ARGV[1])
  for _, id in ipairs(due) do
    local jk = ARGV[2] .. id
    redis.call('ZREM', KEYS[k], id)
    if redis.call('EXISTS', jk) == 1 then
      redis.call('HSET', jk, 'state', 'waiting')
      redis.call('ZADD', KEYS[1], -tonumber(redis.call('HGET', jk, 'priority')), redis.call('HGET', jk, 'member'))
    end
  end
end
local popped = redis.call('ZPOPMIN', KEYS[1])
if #popped == 0 then return false end
local id = string.sub(popped[1], 22)
local jk = ARGV[2] .. id
redis.call('SADD', KEYS[4], id)
redis.call('HSET', jk, 'state', 'active', 'processedOn', ARGV[1])
redis.call('HINCRBY', jk, 'attemptsMade', 1)
return id
";

/// Move an active job to a terminal set and trim that set.
const FINISH_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then return 0 end
redis.call('SREM', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1], 'state', ARGV[6], 'finishedOn', ARGV[2], ARGV[7], ARGV[3])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[1])
local excess = redis.call('ZCARD', KEYS[3]) - tonumber(ARGV[4])
if excess > 0 then
  for _, old in ipairs(redis.call('ZRANGE', KEYS[3], 0, excess - 1)) do
    redis.call('DEL', ARGV[5] .. old)
  end
  redis.call('ZREMRANGEBYRANK', KEYS[3], 0, excess - 1)
end
return 1
";

/// Park an active job in the retry set until its backoff elapses.
const RETRY_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then return 0 end
redis.call('SREM', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1], 'state', 'retrying', 'readyAt', ARGV[2], 'failedReason', ARGV[3])
redis.call('ZADD', KEYS[3], ARGV[2], ARGV[1])
return 1
";

/// Delete a waiting or delayed job; otherwise report its state.
const REMOVE_SCRIPT: &str = r"
local state = redis.call('HGET', KEYS[1], 'state')
if not state then return '' end
if state ~= 'waiting' and state ~= 'delayed' then return state end
local t = redis.call('HGET', KEYS[1], 'type')
redis.call('ZREM', ARGV[2] .. 'wait:' .. t, redis.call('HGET', KEYS[1], 'member'))
redis.call('ZREM', ARGV[2] .. 'delayed:' .. t, ARGV[1])
redis.call('DEL', KEYS[1])
return 'removed'
";

fn ledger_err(err: redis::RedisError) -> BrandmeshError {
    BrandmeshError::Ledger(err.to_string())
}

/// Member of a waiting set. Equal scores sort by submission sequence.
fn wait_member(seq: u64, id: &str) -> String {
    format!("{seq:020}:{id}")
}

/// Flatten a record into hash fields.
fn job_fields(job: &JobRecord) -> BrandmeshResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        ("id", job.id.clone()),
        ("type", job.task_type().as_str().to_string()),
        ("data", serde_json::to_string(&job.data)?),
        ("state", job.state.to_string()),
        ("priority", job.opts.priority.to_string()),
        ("delay", job.opts.delay.to_string()),
        ("timeout", job.opts.timeout.to_string()),
        ("attempts", job.opts.attempts.to_string()),
        ("backoff", job.opts.backoff.to_string()),
        ("attemptsMade", job.attempts_made.to_string()),
        ("seq", job.seq.to_string()),
        ("member", wait_member(job.seq, &job.id)),
        ("timestamp", job.timestamp.to_string()),
        ("readyAt", job.ready_at.to_string()),
    ];
    if let Some(value) = &job.returnvalue {
        fields.push(("returnvalue", serde_json::to_string(value)?));
    }
    if let Some(reason) = &job.failed_reason {
        fields.push(("failedReason", reason.clone()));
    }
    Ok(fields)
}

fn parse_field<T: FromStr>(fields: &HashMap<String, String>, name: &str) -> BrandmeshResult<T> {
    fields
        .get(name)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| BrandmeshError::Ledger(format!("Job hash has invalid field '{name}'")))
}

fn optional_field<T: FromStr>(fields: &HashMap<String, String>, name: &str) -> Option<T> {
    fields.get(name).and_then(|v| v.parse().ok())
}

/// Rebuild a record from its hash fields.
fn record_from_fields(fields: &HashMap<String, String>) -> BrandmeshResult<JobRecord> {
    let data: TaskData = serde_json::from_str(
        fields
            .get("data")
            .ok_or_else(|| BrandmeshError::Ledger("Job hash has no data".into()))?,
    )?;
    let returnvalue = match fields.get("returnvalue") {
        Some(raw) => Some(serde_json::from_str::<Value>(raw)?),
        None => None,
    };
    Ok(JobRecord {
        id: parse_field(fields, "id")?,
        data,
        opts: JobOptions {
            priority: parse_field(fields, "priority")?,
            delay: parse_field(fields, "delay")?,
            timeout: parse_field(fields, "timeout")?,
            attempts: parse_field(fields, "attempts")?,
            backoff: parse_field(fields, "backoff")?,
        },
        state: JobState::from(fields.get("state").map_or("", String::as_str)),
        attempts_made: parse_field(fields, "attemptsMade")?,
        seq: parse_field(fields, "seq")?,
        timestamp: parse_field(fields, "timestamp")?,
        ready_at: parse_field(fields, "readyAt")?,
        processed_on: optional_field(fields, "processedOn"),
        finished_on: optional_field(fields, "finishedOn"),
        returnvalue,
        failed_reason: fields.get("failedReason").cloned(),
    })
}

/// Redis-backed ledger.
///
/// Layout under `brandmesh:<queue>:`:
/// `job:<id>` hash, `wait:<type>` / `delayed:<type>` / `retry:<type>` sorted
/// sets, `active` set, `completed` / `failed` sorted sets by finish time, and
/// the `seq` counter. Each transition runs as one Lua script.
pub struct RedisLedger {
    name: String,
    prefix: String,
    retention: RetentionPolicy,
    client: Arc<Mutex<Option<Client>>>,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisLedger {
    /// Connect to `url` and serve the named queue.
    pub async fn connect(
        url: &str,
        name: impl Into<String>,
        retention: RetentionPolicy,
    ) -> BrandmeshResult<Self> {
        let name = name.into();
        let client = Client::open(url).map_err(ledger_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(ledger_err)?;
        debug!(queue = %name, "Connected job ledger to Redis");
        Ok(Self {
            prefix: format!("brandmesh:{name}:"),
            name,
            retention,
            client: Arc::new(Mutex::new(Some(client))),
            conn: Mutex::new(Some(conn)),
        })
    }

    fn conn(&self) -> BrandmeshResult<MultiplexedConnection> {
        self.conn
            .lock()
            .clone()
            .ok_or_else(|| BrandmeshError::Ledger(format!("Ledger {} is closed", self.name)))
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix)
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}job:{id}", self.prefix)
    }

    fn typed_key(&self, set: &str, task_type: TaskType) -> String {
        format!("{}{set}:{}", self.prefix, task_type.as_str())
    }

    async fn finish(
        &self,
        id: &str,
        state: &str,
        field: &str,
        value: &str,
        keep: usize,
    ) -> BrandmeshResult<bool> {
        let mut conn = self.conn()?;
        let moved: i64 = Script::new(FINISH_SCRIPT)
            .key(self.job_key(id))
            .key(self.key("active"))
            .key(self.key(state))
            .arg(id)
            .arg(now_millis())
            .arg(value)
            .arg(keep)
            .arg(self.key("job:"))
            .arg(state)
            .arg(field)
            .invoke_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        Ok(moved == 1)
    }
}

#[async_trait]
impl JobLedger for RedisLedger {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, job: NewJob) -> BrandmeshResult<JobRecord> {
        let mut conn = self.conn()?;
        let seq: u64 = redis::cmd("INCR")
            .arg(self.key("seq"))
            .query_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        let record = JobRecord::from_new(job, seq, now_millis());

        let (index, score, member) = if record.state == JobState::Delayed {
            (
                self.typed_key("delayed", record.task_type()),
                record.ready_at,
                record.id.clone(),
            )
        } else {
            (
                self.typed_key("wait", record.task_type()),
                -record.opts.priority,
                wait_member(record.seq, &record.id),
            )
        };

        let script = Script::new(ADD_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(self.job_key(&record.id))
            .key(index)
            .arg(score)
            .arg(member);
        for (field, value) in job_fields(&record)? {
            invocation.arg(field).arg(value);
        }
        let added: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        if added == 0 {
            return Err(BrandmeshError::Queue(format!(
                "Job {} already exists",
                record.id
            )));
        }
        Ok(record)
    }

    async fn get(&self, id: &str) -> BrandmeshResult<Option<JobRecord>> {
        let mut conn = self.conn()?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.job_key(id))
            .query_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(&fields).map(Some)
    }

    async fn remove_pending(&self, id: &str) -> BrandmeshResult<RemoveOutcome> {
        let mut conn = self.conn()?;
        let outcome: String = Script::new(REMOVE_SCRIPT)
            .key(self.job_key(id))
            .arg(id)
            .arg(&self.prefix)
            .invoke_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        Ok(match outcome.as_str() {
            "" => RemoveOutcome::NotFound,
            "removed" => RemoveOutcome::Removed,
            state => RemoveOutcome::NotPending(JobState::from(state)),
        })
    }

    async fn claim(&self, task_type: TaskType) -> BrandmeshResult<Option<JobRecord>> {
        let mut conn = self.conn()?;
        let claimed: Option<String> = Script::new(CLAIM_SCRIPT)
            .key(self.typed_key("wait", task_type))
            .key(self.typed_key("delayed", task_type))
            .key(self.typed_key("retry", task_type))
            .key(self.key("active"))
            .arg(now_millis())
            .arg(self.key("job:"))
            .invoke_async(&mut conn)
            .await
            .map_err(ledger_err)?;
        match claimed {
            Some(id) => self.get(&id).await,
            None => Ok(None),
        }
    }

    async fn complete(&self, id: &str, value: Value) -> BrandmeshResult<()> {
        let raw = serde_json::to_string(&value)?;
        let keep = self.retention.keep_completed;
        if !self.finish(id, "completed", "returnvalue", &raw, keep).await? {
            return Err(BrandmeshError::Ledger(format!("Job {id} is not active")));
        }
        Ok(())
    }

    async fn fail(&self, id: &str, reason: &str) -> BrandmeshResult<FailOutcome> {
        let job = self
            .get(id)
            .await?
            .filter(|job| job.state == JobState::Active)
            .ok_or_else(|| BrandmeshError::Ledger(format!("Job {id} is not active")))?;

        if job.attempts_made < job.opts.attempts {
            let delay = job.opts.backoff_delay(job.attempts_made);
            let ready_at = now_millis().saturating_add(i64::try_from(delay).unwrap_or(i64::MAX));
            let mut conn = self.conn()?;
            let moved: i64 = Script::new(RETRY_SCRIPT)
                .key(self.job_key(id))
                .key(self.key("active"))
                .key(self.typed_key("retry", job.task_type()))
                .arg(id)
                .arg(ready_at)
                .arg(reason)
                .invoke_async(&mut conn)
                .await
                .map_err(ledger_err)?;
            if moved == 0 {
                return Err(BrandmeshError::Ledger(format!("Job {id} is not active")));
            }
            return Ok(FailOutcome::Retrying {
                attempts_made: job.attempts_made,
                ready_at,
            });
        }

        let keep = self.retention.keep_failed;
        if !self.finish(id, "failed", "failedReason", reason, keep).await? {
            return Err(BrandmeshError::Ledger(format!("Job {id} is not active")));
        }
        Ok(FailOutcome::Failed)
    }

    async fn counts(&self) -> BrandmeshResult<LedgerCounts> {
        let mut conn = self.conn()?;
        let mut pipe = redis::pipe();
        for task_type in TaskType::ALL {
            for set in ["wait", "delayed", "retry"] {
                pipe.cmd("ZCARD").arg(self.typed_key(set, task_type));
            }
        }
        pipe.cmd("SCARD").arg(self.key("active"));
        pipe.cmd("ZCARD").arg(self.key("completed"));
        pipe.cmd("ZCARD").arg(self.key("failed"));

        let sizes: Vec<u64> = pipe.query_async(&mut conn).await.map_err(ledger_err)?;
        let mut counts = LedgerCounts::default();
        let (per_type, tail) = sizes.split_at(sizes.len().saturating_sub(3));
        for chunk in per_type.chunks(3) {
            if let [waiting, delayed, retrying] = chunk {
                counts.waiting += waiting;
                counts.delayed += delayed;
                counts.retrying += retrying;
            }
        }
        if let [active, completed, failed] = tail {
            counts.active = *active;
            counts.completed = *completed;
            counts.failed = *failed;
        }
        Ok(counts)
    }

    async fn duplicate(&self) -> BrandmeshResult<Arc<dyn JobLedger>> {
        let client = self
            .client
            .lock()
            .clone()
            .ok_or_else(|| BrandmeshError::Ledger(format!("Ledger {} is disconnected", self.name)))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(ledger_err)?;
        Ok(Arc::new(RedisLedger {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            retention: self.retention,
            client: Arc::clone(&self.client),
            conn: Mutex::new(Some(conn)),
        }))
    }

    async fn close(&self) -> BrandmeshResult<()> {
        self.conn.lock().take();
        Ok(())
    }

    async fn disconnect(&self) -> BrandmeshResult<()> {
        self.conn.lock().take();
        self.client.lock().take();
        debug!(queue = %self.name, "Disconnected job ledger from Redis");
        Ok(())
    }
}
