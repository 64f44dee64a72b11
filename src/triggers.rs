use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::job::JobKey;

/// Prefix of the persisted entries holding one trigger per job key.
pub const TRIGGERS_PREFIX: &str = "cleanup_subscribers_trigger";

const NEXT_RUN_FIELD: &str = "next_run_ms";
const INTERVAL_FIELD: &str = "interval_ms";

/// Persisted schedule of a job: when it fires next and how often it repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub next_run: DateTime<Utc>,
    pub interval: Duration,
}

impl ScheduledTrigger {
    /// Moves `next_run` to the first run after `now`, keeping the phase. Always
    /// advances by at least one interval.
    pub fn advance(self, now: DateTime<Utc>) -> Self {
        let interval_ms = self.interval.as_millis().max(1) as i64;
        let behind_ms = (now - self.next_run).num_milliseconds().max(0);
        let periods = behind_ms / interval_ms + 1;

        Self {
            next_run: self.next_run + chrono::Duration::milliseconds(periods * interval_ms),
            interval: self.interval,
        }
    }

    fn to_fields(self) -> [(&'static str, i64); 2] {
        [
            (NEXT_RUN_FIELD, self.next_run.timestamp_millis()),
            (INTERVAL_FIELD, self.interval.as_millis() as i64),
        ]
    }

    fn from_fields(fields: &HashMap<String, i64>) -> Option<Self> {
        let next_run = Utc
            .timestamp_millis_opt(*fields.get(NEXT_RUN_FIELD)?)
            .single()?;
        let interval = u64::try_from(*fields.get(INTERVAL_FIELD)?).ok()?;

        if interval == 0 {
            return None;
        }

        Some(Self {
            next_run,
            interval: Duration::from_millis(interval),
        })
    }
}

/// Schedule state that outlives the process.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn load(&self, job: &JobKey) -> Result<Option<ScheduledTrigger>, TriggerStoreError>;

    async fn save(&self, job: &JobKey, trigger: &ScheduledTrigger) -> Result<(), TriggerStoreError>;

    /// Returns whether a trigger was stored for `job`.
    async fn remove(&self, job: &JobKey) -> Result<bool, TriggerStoreError>;
}

#[derive(thiserror::Error)]
pub enum TriggerStoreError {
    #[error("Failed to access the triggers store.")]
    RedisError(#[from] redis::RedisError),
}

impl std::fmt::Debug for TriggerStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

/// Keeps every trigger in its own Redis hash, `{prefix}:{job}`.
pub struct RedisTriggerStore {
    redis_client: redis::Client,
    prefix: String,
}

impl RedisTriggerStore {
    pub fn new(redis_client: redis::Client) -> Self {
        Self::with_prefix(redis_client, TRIGGERS_PREFIX.to_string())
    }

    pub fn with_prefix(redis_client: redis::Client, prefix: String) -> Self {
        Self {
            redis_client,
            prefix,
        }
    }

    fn key(&self, job: &JobKey) -> String {
        format!("{}:{}", self.prefix, job)
    }
}

#[async_trait]
impl TriggerStore for RedisTriggerStore {
    #[tracing::instrument(name = "Loading a trigger from Redis", skip(self, job), fields(job = %job))]
    async fn load(&self, job: &JobKey) -> Result<Option<ScheduledTrigger>, TriggerStoreError> {
        let mut redis_conn = self.redis_client.get_tokio_connection().await?;

        let fields: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(self.key(job))
            .query_async(&mut redis_conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let trigger = ScheduledTrigger::from_fields(&fields);

        if trigger.is_none() {
            tracing::warn!("Ignoring malformed trigger of {}: {:?}", job, fields);
        }

        Ok(trigger)
    }

    #[tracing::instrument(name = "Storing a trigger in Redis", skip(self, job), fields(job = %job))]
    async fn save(&self, job: &JobKey, trigger: &ScheduledTrigger) -> Result<(), TriggerStoreError> {
        let mut redis_conn = self.redis_client.get_tokio_connection().await?;
        let mut command = redis::cmd("HSET");

        command.arg(self.key(job));
        for (field, value) in trigger.to_fields() {
            command.arg(field).arg(value);
        }

        command.query_async::<_, ()>(&mut redis_conn).await?;

        Ok(())
    }

    #[tracing::instrument(name = "Deleting a trigger from Redis", skip(self, job), fields(job = %job))]
    async fn remove(&self, job: &JobKey) -> Result<bool, TriggerStoreError> {
        let mut redis_conn = self.redis_client.get_tokio_connection().await?;

        let removed: u64 = redis::cmd("DEL")
            .arg(self.key(job))
            .query_async(&mut redis_conn)
            .await?;

        Ok(removed > 0)
    }
}
