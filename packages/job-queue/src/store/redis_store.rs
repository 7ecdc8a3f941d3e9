//! Redis-backed job store
//!
//! Key layout, all under `{prefix}:{queue}`:
//!
//! | Key | Type | Content |
//! |---|---|---|
//! | `:job:{id}` | hash | the job record |
//! | `:wait` | list | waiting ids, pushed left, popped right |
//! | `:active` | sorted set | active ids scored by lock expiry |
//! | `:delayed` | sorted set | delayed ids scored by run-at |
//! | `:completed` | sorted set | completed ids scored by finish time |
//! | `:failed` | sorted set | failed ids scored by finish time |
//!
//! Each transition is a single Lua script, so a job id is always in exactly
//! one of the collections and concurrent workers never claim the same job.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::debug;

use super::{ensure_finished, JobStore};
use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, JobRecord, JobState, QueueCounts, StalledReport, STALLED_REASON};

/// Moves due delayed jobs onto the wait list.
/// KEYS: wait, delayed. ARGV: job key prefix, now.
macro_rules! promote_lua {
    () => {
        r#"
        local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[2])
        for _, id in ipairs(due) do
            redis.call('ZREM', KEYS[2], id)
            local key = ARGV[1] .. id
            if redis.call('EXISTS', key) == 1 then
                redis.call('HSET', key, 'state', 'waiting')
                redis.call('HDEL', key, 'run_at')
                redis.call('LPUSH', KEYS[1], id)
            end
        end
        "#
    };
}

const PROMOTE: &str = concat!(promote_lua!(), "return #due");

/// KEYS: wait, delayed, active. ARGV: job key prefix, now, lock expiry, token.
const CLAIM: &str = concat!(
    promote_lua!(),
    r#"
    while true do
        local id = redis.call('RPOP', KEYS[1])
        if not id then
            return false
        end
        local key = ARGV[1] .. id
        -- Skip ids whose record was removed while queued
        if redis.call('EXISTS', key) == 1 then
            redis.call('ZADD', KEYS[3], ARGV[3], id)
            redis.call('HSET', key, 'state', 'active', 'processed_at', ARGV[2], 'lock_token', ARGV[4])
            return redis.call('HGETALL', key)
        end
    end
    "#
);

/// KEYS: active. ARGV: job key, id, token, new expiry.
const EXTEND: &str = r#"
    if redis.call('HGET', ARGV[1], 'lock_token') ~= ARGV[3] then
        return 0
    end
    if not redis.call('ZSCORE', KEYS[1], ARGV[2]) then
        return 0
    end
    redis.call('ZADD', KEYS[1], 'XX', ARGV[4], ARGV[2])
    return 1
"#;

/// KEYS: active. ARGV: job key, id, token, progress.
const PROGRESS: &str = r#"
    if redis.call('HGET', ARGV[1], 'lock_token') ~= ARGV[3] then
        return 0
    end
    if not redis.call('ZSCORE', KEYS[1], ARGV[2]) then
        return 0
    end
    redis.call('HSET', ARGV[1], 'progress', ARGV[4])
    return 1
"#;

/// KEYS: active, completed. ARGV: job key, id, token, now, return value.
const COMPLETE: &str = r#"
    if redis.call('HGET', ARGV[1], 'lock_token') ~= ARGV[3] then
        return 0
    end
    if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then
        return 0
    end
    redis.call('HINCRBY', ARGV[1], 'attempts_made', 1)
    redis.call('HSET', ARGV[1], 'state', 'completed', 'finished_at', ARGV[4], 'progress', 100, 'return_value', ARGV[5])
    redis.call('HDEL', ARGV[1], 'lock_token', 'failed_reason')
    redis.call('ZADD', KEYS[2], ARGV[4], ARGV[2])
    return 1
"#;

/// KEYS: active, delayed, failed. ARGV: job key, id, token, now, reason,
/// retry-at (empty for a final failure).
const FAIL: &str = r#"
    if redis.call('HGET', ARGV[1], 'lock_token') ~= ARGV[3] then
        return 0
    end
    if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then
        return 0
    end
    redis.call('HINCRBY', ARGV[1], 'attempts_made', 1)
    redis.call('HDEL', ARGV[1], 'lock_token')
    if ARGV[6] ~= '' then
        redis.call('HSET', ARGV[1], 'state', 'delayed', 'run_at', ARGV[6], 'failed_reason', ARGV[5])
        redis.call('ZADD', KEYS[2], ARGV[6], ARGV[2])
    else
        redis.call('HSET', ARGV[1], 'state', 'failed', 'finished_at', ARGV[4], 'failed_reason', ARGV[5])
        redis.call('ZADD', KEYS[3], ARGV[4], ARGV[2])
    end
    return 1
"#;

/// KEYS: failed, wait. ARGV: job key, id, payload (empty keeps the old one).
/// Returns -1 when the job is missing, 0 when it is not failed.
const RETRY: &str = r#"
    if redis.call('EXISTS', ARGV[1]) == 0 then
        return -1
    end
    if redis.call('ZREM', KEYS[1], ARGV[2]) == 0 then
        return 0
    end
    if ARGV[3] ~= '' then
        redis.call('HSET', ARGV[1], 'payload', ARGV[3])
    end
    redis.call('HSET', ARGV[1], 'state', 'waiting', 'attempts_made', 0, 'progress', 0, 'stalled_count', 0)
    redis.call('HDEL', ARGV[1], 'failed_reason', 'finished_at', 'processed_at', 'return_value')
    redis.call('LPUSH', KEYS[2], ARGV[2])
    return 1
"#;

/// KEYS: wait, active, delayed, completed, failed. ARGV: job key, id.
/// Returns 0 when missing, -1 when active.
const REMOVE: &str = r#"
    if redis.call('EXISTS', ARGV[1]) == 0 then
        return 0
    end
    if redis.call('ZSCORE', KEYS[2], ARGV[2]) then
        return -1
    end
    redis.call('LREM', KEYS[1], 0, ARGV[2])
    redis.call('ZREM', KEYS[3], ARGV[2])
    redis.call('ZREM', KEYS[4], ARGV[2])
    redis.call('ZREM', KEYS[5], ARGV[2])
    redis.call('DEL', ARGV[1])
    return 1
"#;

/// KEYS: finished set. ARGV: job key prefix, older-than, limit.
const CLEAN: &str = r#"
    local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[2], 'LIMIT', 0, ARGV[3])
    for _, id in ipairs(ids) do
        redis.call('ZREM', KEYS[1], id)
        redis.call('DEL', ARGV[1] .. id)
    end
    return ids
"#;

/// KEYS: finished set. ARGV: job key prefix, number to keep.
const TRIM: &str = r#"
    local excess = redis.call('ZCARD', KEYS[1]) - tonumber(ARGV[2])
    if excess <= 0 then
        return 0
    end
    local ids = redis.call('ZRANGE', KEYS[1], 0, excess - 1)
    for _, id in ipairs(ids) do
        redis.call('ZREM', KEYS[1], id)
        redis.call('DEL', ARGV[1] .. id)
    end
    return #ids
"#;

/// KEYS: wait, active, failed. ARGV: job key prefix, now, max stalled,
/// failure reason. Returns `{requeued, failed}`.
const STALLED: &str = r#"
    local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', '(' .. ARGV[2])
    local requeued = {}
    local failed = {}
    for _, id in ipairs(expired) do
        redis.call('ZREM', KEYS[2], id)
        local key = ARGV[1] .. id
        if redis.call('EXISTS', key) == 1 then
            local count = redis.call('HINCRBY', key, 'stalled_count', 1)
            redis.call('HDEL', key, 'lock_token')
            if count > tonumber(ARGV[3]) then
                redis.call('HSET', key, 'state', 'failed', 'failed_reason', ARGV[4], 'finished_at', ARGV[2])
                redis.call('ZADD', KEYS[3], ARGV[2], id)
                table.insert(failed, id)
            else
                -- Back to the front of the line
                redis.call('HSET', key, 'state', 'waiting')
                redis.call('RPUSH', KEYS[1], id)
                table.insert(requeued, id)
            end
        end
    end
    return {requeued, failed}
"#;

struct Scripts {
    promote: Script,
    claim: Script,
    extend: Script,
    progress: Script,
    complete: Script,
    fail: Script,
    retry: Script,
    remove: Script,
    clean: Script,
    trim: Script,
    stalled: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            promote: Script::new(PROMOTE),
            claim: Script::new(CLAIM),
            extend: Script::new(EXTEND),
            progress: Script::new(PROGRESS),
            complete: Script::new(COMPLETE),
            fail: Script::new(FAIL),
            retry: Script::new(RETRY),
            remove: Script::new(REMOVE),
            clean: Script::new(CLEAN),
            trim: Script::new(TRIM),
            stalled: Script::new(STALLED),
        }
    }
}

/// Key names for one queue
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueKeys {
    base: String,
}

impl QueueKeys {
    fn new(prefix: &str, queue: &str) -> Self {
        Self {
            base: format!("{}:{}", prefix, queue),
        }
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.base)
    }

    fn job(&self, id: JobId) -> String {
        format!("{}:job:{}", self.base, id)
    }

    fn wait(&self) -> String {
        format!("{}:wait", self.base)
    }

    fn active(&self) -> String {
        format!("{}:active", self.base)
    }

    fn delayed(&self) -> String {
        format!("{}:delayed", self.base)
    }

    fn completed(&self) -> String {
        format!("{}:completed", self.base)
    }

    fn failed(&self) -> String {
        format!("{}:failed", self.base)
    }

    fn finished(&self, state: JobState) -> String {
        match state {
            JobState::Failed => self.failed(),
            _ => self.completed(),
        }
    }
}

/// Job store on top of a Redis server
pub struct RedisJobStore {
    client: redis::Client,
    queue: String,
    keys: QueueKeys,
    scripts: Scripts,
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("queue", &self.queue)
            .field("keys", &self.keys.base)
            .finish()
    }
}

impl RedisJobStore {
    pub fn new(client: redis::Client, prefix: &str, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            client,
            keys: QueueKeys::new(prefix, &queue),
            queue,
            scripts: Scripts::load(),
        }
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn lock_lost(&self, id: JobId) -> QueueError {
        debug!(queue = %self.queue, job_id = %id, "Lock token mismatch");
        QueueError::LockLost(id)
    }

    async fn load_many(
        &self,
        conn: &mut MultiplexedConnection,
        ids: Vec<String>,
    ) -> QueueResult<Vec<JobRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.cmd("HGETALL").arg(format!("{}{}", self.keys.job_prefix(), id));
        }
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(conn).await?;

        hashes
            .into_iter()
            .filter(|fields| !fields.is_empty())
            .map(|fields| record_from_hash(&fields))
            .collect()
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    async fn insert(&self, job: &JobRecord) -> QueueResult<()> {
        let fields = record_to_hash(job)?;
        let mut conn = self.conn().await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("HSET")
            .arg(self.keys.job(job.id))
            .arg(&fields)
            .ignore();
        match (job.state, job.run_at) {
            (JobState::Delayed, Some(run_at)) => {
                pipe.cmd("ZADD")
                    .arg(self.keys.delayed())
                    .arg(run_at)
                    .arg(job.id.to_string())
                    .ignore();
            }
            (JobState::Waiting, _) => {
                pipe.cmd("LPUSH")
                    .arg(self.keys.wait())
                    .arg(job.id.to_string())
                    .ignore();
            }
            (state, _) => {
                return Err(QueueError::InvalidState {
                    id: job.id,
                    state,
                    expected: "waiting or delayed",
                })
            }
        }

        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, id: JobId) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.keys.job(id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_hash(&fields).map(Some)
    }

    async fn promote_delayed(&self, now: i64) -> QueueResult<usize> {
        let mut conn = self.conn().await?;
        let promoted: usize = self
            .scripts
            .promote
            .key(self.keys.wait())
            .key(self.keys.delayed())
            .arg(self.keys.job_prefix())
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(promoted)
    }

    async fn claim_next(
        &self,
        now: i64,
        lock_ms: u64,
        token: &str,
    ) -> QueueResult<Option<JobRecord>> {
        let mut conn = self.conn().await?;
        let lock_until = now.saturating_add(lock_ms as i64);
        let fields: Option<HashMap<String, String>> = self
            .scripts
            .claim
            .key(self.keys.wait())
            .key(self.keys.delayed())
            .key(self.keys.active())
            .arg(self.keys.job_prefix())
            .arg(now)
            .arg(lock_until)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;

        match fields {
            Some(fields) if !fields.is_empty() => record_from_hash(&fields).map(Some),
            _ => Ok(None),
        }
    }

    async fn extend_lock(&self, id: JobId, token: &str, until: i64) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let extended: i64 = self
            .scripts
            .extend
            .key(self.keys.active())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .arg(token)
            .arg(until)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn update_progress(&self, id: JobId, token: &str, progress: u8) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let updated: i64 = self
            .scripts
            .progress
            .key(self.keys.active())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .arg(token)
            .arg(u32::from(progress.min(100)))
            .invoke_async(&mut conn)
            .await?;

        if updated == 1 {
            Ok(())
        } else {
            Err(self.lock_lost(id))
        }
    }

    async fn complete(
        &self,
        id: JobId,
        token: &str,
        return_value: &serde_json::Value,
        now: i64,
    ) -> QueueResult<()> {
        let encoded = serde_json::to_string(return_value)?;
        let mut conn = self.conn().await?;
        let completed: i64 = self
            .scripts
            .complete
            .key(self.keys.active())
            .key(self.keys.completed())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .arg(token)
            .arg(now)
            .arg(encoded)
            .invoke_async(&mut conn)
            .await?;

        if completed == 1 {
            Ok(())
        } else {
            Err(self.lock_lost(id))
        }
    }

    async fn fail(
        &self,
        id: JobId,
        token: &str,
        reason: &str,
        retry_at: Option<i64>,
        now: i64,
    ) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let failed: i64 = self
            .scripts
            .fail
            .key(self.keys.active())
            .key(self.keys.delayed())
            .key(self.keys.failed())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .arg(token)
            .arg(now)
            .arg(reason)
            .arg(retry_at.map(|at| at.to_string()).unwrap_or_default())
            .invoke_async(&mut conn)
            .await?;

        if failed == 1 {
            Ok(())
        } else {
            Err(self.lock_lost(id))
        }
    }

    async fn retry(&self, id: JobId, payload: Option<&serde_json::Value>) -> QueueResult<()> {
        let payload = payload
            .map(serde_json::to_string)
            .transpose()?
            .unwrap_or_default();
        let mut conn = self.conn().await?;
        let outcome: i64 = self
            .scripts
            .retry
            .key(self.keys.failed())
            .key(self.keys.wait())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(()),
            -1 => Err(QueueError::NotFound(id)),
            _ => {
                let state = self
                    .get(id)
                    .await?
                    .map(|job| job.state)
                    .ok_or(QueueError::NotFound(id))?;
                Err(QueueError::InvalidState {
                    id,
                    state,
                    expected: "failed",
                })
            }
        }
    }

    async fn remove(&self, id: JobId) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let outcome: i64 = self
            .scripts
            .remove
            .key(self.keys.wait())
            .key(self.keys.active())
            .key(self.keys.delayed())
            .key(self.keys.completed())
            .key(self.keys.failed())
            .arg(self.keys.job(id))
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(true),
            -1 => Err(QueueError::InvalidState {
                id,
                state: JobState::Active,
                expected: "not active",
            }),
            _ => Ok(false),
        }
    }

    async fn counts(&self) -> QueueResult<QueueCounts> {
        let mut conn = self.conn().await?;
        let (waiting, active, delayed, completed, failed): (usize, usize, usize, usize, usize) =
            redis::pipe()
                .cmd("LLEN")
                .arg(self.keys.wait())
                .cmd("ZCARD")
                .arg(self.keys.active())
                .cmd("ZCARD")
                .arg(self.keys.delayed())
                .cmd("ZCARD")
                .arg(self.keys.completed())
                .cmd("ZCARD")
                .arg(self.keys.failed())
                .query_async(&mut conn)
                .await?;

        Ok(QueueCounts {
            waiting,
            active,
            delayed,
            completed,
            failed,
        })
    }

    async fn list(
        &self,
        state: JobState,
        offset: usize,
        limit: usize,
    ) -> QueueResult<Vec<JobRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let start = offset as isize;
        let stop = (offset + limit - 1) as isize;

        let ids: Vec<String> = match state {
            // The oldest waiting job sits at the tail of the list
            JobState::Waiting => {
                let mut ids: Vec<String> = redis::cmd("LRANGE")
                    .arg(self.keys.wait())
                    .arg(-stop - 1)
                    .arg(-start - 1)
                    .query_async(&mut conn)
                    .await?;
                ids.reverse();
                ids
            }
            JobState::Active | JobState::Delayed => {
                let key = if state == JobState::Active {
                    self.keys.active()
                } else {
                    self.keys.delayed()
                };
                redis::cmd("ZRANGE")
                    .arg(key)
                    .arg(start)
                    .arg(stop)
                    .query_async(&mut conn)
                    .await?
            }
            JobState::Completed | JobState::Failed => {
                redis::cmd("ZREVRANGE")
                    .arg(self.keys.finished(state))
                    .arg(start)
                    .arg(stop)
                    .query_async(&mut conn)
                    .await?
            }
        };

        self.load_many(&mut conn, ids).await
    }

    async fn wait_position(&self, id: JobId) -> QueueResult<Option<usize>> {
        let mut conn = self.conn().await?;
        let (index, len): (Option<usize>, usize) = redis::pipe()
            .atomic()
            .cmd("LPOS")
            .arg(self.keys.wait())
            .arg(id.to_string())
            .cmd("LLEN")
            .arg(self.keys.wait())
            .query_async(&mut conn)
            .await?;

        Ok(index.map(|index| len - index))
    }

    async fn clean(
        &self,
        state: JobState,
        older_than: i64,
        limit: usize,
    ) -> QueueResult<Vec<JobId>> {
        ensure_finished(state)?;
        let mut conn = self.conn().await?;
        let ids: Vec<String> = self
            .scripts
            .clean
            .key(self.keys.finished(state))
            .arg(self.keys.job_prefix())
            .arg(older_than)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;

        parse_ids(ids)
    }

    async fn trim(&self, state: JobState, keep: usize) -> QueueResult<usize> {
        ensure_finished(state)?;
        let mut conn = self.conn().await?;
        let removed: usize = self
            .scripts
            .trim
            .key(self.keys.finished(state))
            .arg(self.keys.job_prefix())
            .arg(keep)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn recover_stalled(&self, now: i64, max_stalled: u32) -> QueueResult<StalledReport> {
        let mut conn = self.conn().await?;
        let (requeued, failed): (Vec<String>, Vec<String>) = self
            .scripts
            .stalled
            .key(self.keys.wait())
            .key(self.keys.active())
            .key(self.keys.failed())
            .arg(self.keys.job_prefix())
            .arg(now)
            .arg(max_stalled)
            .arg(STALLED_REASON)
            .invoke_async(&mut conn)
            .await?;

        Ok(StalledReport {
            requeued: parse_ids(requeued)?,
            failed: parse_ids(failed)?,
        })
    }
}

fn parse_ids(ids: Vec<String>) -> QueueResult<Vec<JobId>> {
    ids.into_iter()
        .map(|id| {
            id.parse::<JobId>()
                .map_err(|e| QueueError::corrupt(id.clone(), e.to_string()))
        })
        .collect()
}

fn record_to_hash(job: &JobRecord) -> QueueResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        ("id", job.id.to_string()),
        ("queue", job.queue.clone()),
        ("name", job.name.clone()),
        ("payload", serde_json::to_string(&job.payload)?),
        ("options", serde_json::to_string(&job.options)?),
        ("state", job.state.as_str().to_string()),
        ("attempts_made", job.attempts_made.to_string()),
        ("progress", job.progress.to_string()),
        ("created_at", job.created_at.to_string()),
        ("stalled_count", job.stalled_count.to_string()),
    ];

    let optional = [
        ("processed_at", job.processed_at.map(|v| v.to_string())),
        ("finished_at", job.finished_at.map(|v| v.to_string())),
        ("run_at", job.run_at.map(|v| v.to_string())),
        ("failed_reason", job.failed_reason.clone()),
        ("lock_token", job.lock_token.clone()),
    ];
    fields.extend(
        optional
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value))),
    );

    if let Some(value) = &job.return_value {
        fields.push(("return_value", serde_json::to_string(value)?));
    }

    Ok(fields)
}

fn required<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a String, String> {
    fields
        .get(name)
        .ok_or_else(|| format!("missing field '{}'", name))
}

fn parsed<T>(fields: &HashMap<String, String>, name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    fields
        .get(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| format!("invalid field '{}': {}", name, e))
        })
        .transpose()
}

fn record_from_hash(fields: &HashMap<String, String>) -> QueueResult<JobRecord> {
    let raw_id = fields.get("id").map(String::as_str).unwrap_or("<unknown>");
    let corrupt = |reason: String| QueueError::corrupt(raw_id, reason);

    let id = required(fields, "id")
        .map_err(corrupt)?
        .parse::<JobId>()
        .map_err(|e| corrupt(e.to_string()))?;
    let state = required(fields, "state")
        .map_err(corrupt)?
        .parse::<JobState>()
        .map_err(corrupt)?;
    let created_at = parsed::<i64>(fields, "created_at")
        .map_err(corrupt)?
        .ok_or_else(|| corrupt("missing field 'created_at'".to_string()))?;

    let payload = serde_json::from_str(required(fields, "payload").map_err(corrupt)?)?;
    let options = serde_json::from_str(required(fields, "options").map_err(corrupt)?)?;
    let return_value = fields
        .get("return_value")
        .map(|raw| serde_json::from_str(raw))
        .transpose()?;

    Ok(JobRecord {
        id,
        queue: required(fields, "queue").map_err(corrupt)?.clone(),
        name: required(fields, "name").map_err(corrupt)?.clone(),
        payload,
        options,
        state,
        attempts_made: parsed(fields, "attempts_made").map_err(corrupt)?.unwrap_or(0),
        progress: parsed(fields, "progress").map_err(corrupt)?.unwrap_or(0),
        created_at,
        processed_at: parsed(fields, "processed_at").map_err(corrupt)?,
        finished_at: parsed(fields, "finished_at").map_err(corrupt)?,
        run_at: parsed(fields, "run_at").map_err(corrupt)?,
        failed_reason: fields.get("failed_reason").cloned(),
        return_value,
        stalled_count: parsed(fields, "stalled_count").map_err(corrupt)?.unwrap_or(0),
        lock_token: fields.get("lock_token").cloned(),
    })
}
