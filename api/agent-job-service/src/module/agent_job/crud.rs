use super::model::JobRecord;
use super::schema::JobStatus;
use crate::infra::{AGENT_JOBS_COLLECTION, BLOCKCHAIN_ID_INDEX};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client as RedisClient, Script};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("stale state for job {job_id}: expected {expected}, found {actual}")]
    StaleState {
        job_id: String,
        expected: JobStatus,
        actual: JobStatus,
    },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job store backend error: {0}")]
    Backend(String),
}

/// Durable mapping from job id to job record.
///
/// `compare_and_swap` is the only mutation after `create`. It succeeds only when the stored
/// status equals `expected_status` and `new_record.revision` is exactly one past the stored
/// revision, so two writers racing from the same snapshot can never both commit.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError>;

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    async fn compare_and_swap(
        &self,
        job_id: &str,
        expected_status: JobStatus,
        new_record: &JobRecord,
    ) -> Result<(), StoreError>;

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<MemoryJobStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryJobStoreInner {
    jobs_by_id: HashMap<String, JobRecord>,
    job_by_blockchain_id: HashMap<String, String>,
}

impl MemoryJobStore {
    fn lock_store(&self) -> Result<MutexGuard<'_, MemoryJobStoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("job store lock poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut inner = self.lock_store()?;
        if inner.jobs_by_id.contains_key(&record.job_id) {
            return Err(StoreError::Conflict(format!("job_id {}", record.job_id)));
        }
        if inner
            .job_by_blockchain_id
            .contains_key(&record.blockchain_identifier)
        {
            return Err(StoreError::Conflict(format!(
                "blockchain identifier {}",
                record.blockchain_identifier
            )));
        }
        inner.job_by_blockchain_id.insert(
            record.blockchain_identifier.clone(),
            record.job_id.clone(),
        );
        inner
            .jobs_by_id
            .insert(record.job_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let inner = self.lock_store()?;
        Ok(inner.jobs_by_id.get(job_id).cloned())
    }

    async fn compare_and_swap(
        &self,
        job_id: &str,
        expected_status: JobStatus,
        new_record: &JobRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock_store()?;
        let stored = inner
            .jobs_by_id
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;
        if stored.status != expected_status || stored.revision + 1 != new_record.revision {
            return Err(StoreError::StaleState {
                job_id: job_id.to_string(),
                expected: expected_status,
                actual: stored.status,
            });
        }
        *stored = new_record.clone();
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<String>, StoreError> {
        let inner = self.lock_store()?;
        let mut jobs = inner
            .jobs_by_id
            .values()
            .filter(|j| j.status == status)
            .map(|j| (j.created_at, j.job_id.clone()))
            .collect::<Vec<_>>();
        jobs.sort();
        Ok(jobs.into_iter().map(|(_, id)| id).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock_store().map(|_| ())
    }
}

const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 'job_exists'
end
if redis.call('HSETNX', KEYS[4], ARGV[4], ARGV[5]) == 0 then
  return 'identifier_exists'
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
redis.call('SET', KEYS[3], ARGV[3])
redis.call('SADD', KEYS[5], ARGV[5])
return 'ok'
"#;

const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[2])
if not current then
  return 'missing'
end
if current ~= ARGV[1] then
  return current
end
local revision = tonumber(redis.call('GET', KEYS[3]) or '0')
if revision + 1 ~= tonumber(ARGV[4]) then
  return 'stale_revision'
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SET', KEYS[2], ARGV[3])
redis.call('SET', KEYS[3], ARGV[4])
redis.call('SREM', KEYS[4], ARGV[5])
redis.call('SADD', KEYS[5], ARGV[5])
return 'ok'
"#;

/// Redis-backed store. Every record lives under `agent_jobs:{id}` with sibling status and
/// revision keys; create and CAS run as Lua scripts so each is a single atomic step.
#[derive(Debug, Clone)]
pub struct RedisJobStore {
    client: RedisClient,
    create_script: Script,
    cas_script: Script,
}

impl RedisJobStore {
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            create_script: Script::new(CREATE_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend(format!("redis connect failed: {e}")))
    }
}

fn record_key(job_id: &str) -> String {
    format!("{AGENT_JOBS_COLLECTION}:{job_id}")
}

fn status_key(job_id: &str) -> String {
    format!("{AGENT_JOBS_COLLECTION}:{job_id}:status")
}

fn revision_key(job_id: &str) -> String {
    format!("{AGENT_JOBS_COLLECTION}:{job_id}:revision")
}

fn status_set_key(status: JobStatus) -> String {
    format!("{AGENT_JOBS_COLLECTION}:status:{}", status.as_str())
}

fn encode(record: &JobRecord) -> Result<String, StoreError> {
    serde_json::to_string(record)
        .map_err(|e| StoreError::Backend(format!("record encode failed: {e}")))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let outcome: String = self
            .create_script
            .key(record_key(&record.job_id))
            .key(status_key(&record.job_id))
            .key(revision_key(&record.job_id))
            .key(BLOCKCHAIN_ID_INDEX)
            .key(status_set_key(record.status))
            .arg(encode(record)?)
            .arg(record.status.as_str())
            .arg(record.revision)
            .arg(&record.blockchain_identifier)
            .arg(&record.job_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("create script failed: {e}")))?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "job_exists" => Err(StoreError::Conflict(format!("job_id {}", record.job_id))),
            "identifier_exists" => Err(StoreError::Conflict(format!(
                "blockchain identifier {}",
                record.blockchain_identifier
            ))),
            other => Err(StoreError::Backend(format!(
                "unexpected create outcome: {other}"
            ))),
        }
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(record_key(job_id))
            .await
            .map_err(|e| StoreError::Backend(format!("redis query failed: {e}")))?;
        raw.map(|s| serde_json::from_str::<JobRecord>(&s))
            .transpose()
            .map_err(|e| StoreError::Backend(format!("record decode failed: {e}")))
    }

    async fn compare_and_swap(
        &self,
        job_id: &str,
        expected_status: JobStatus,
        new_record: &JobRecord,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let outcome: String = self
            .cas_script
            .key(record_key(job_id))
            .key(status_key(job_id))
            .key(revision_key(job_id))
            .key(status_set_key(expected_status))
            .key(status_set_key(new_record.status))
            .arg(expected_status.as_str())
            .arg(encode(new_record)?)
            .arg(new_record.status.as_str())
            .arg(new_record.revision)
            .arg(job_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("cas script failed: {e}")))?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "missing" => Err(StoreError::NotFound(job_id.to_string())),
            "stale_revision" => Err(StoreError::StaleState {
                job_id: job_id.to_string(),
                expected: expected_status,
                actual: expected_status,
            }),
            actual => match JobStatus::parse(actual) {
                Some(actual) => Err(StoreError::StaleState {
                    job_id: job_id.to_string(),
                    expected: expected_status,
                    actual,
                }),
                None => Err(StoreError::Backend(format!(
                    "unexpected cas outcome: {actual}"
                ))),
            },
        }
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let mut job_ids: Vec<String> = conn
            .smembers(status_set_key(status))
            .await
            .map_err(|e| StoreError::Backend(format!("redis query failed: {e}")))?;
        job_ids.sort();
        Ok(job_ids)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Backend(format!("redis ping failed: {e}")))?;
        Ok(())
    }
}
