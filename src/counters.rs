use async_trait::async_trait;
use std::collections::HashMap;

/// Name of the persisted entry holding every job counter.
pub const COUNTERS_ENTRY: &str = "cleanup_subscribers_log";

/// Advisory totals of subscribers affected per job, keyed by status label or `deleted`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobCounters(HashMap<String, u64>);

impl JobCounters {
    /// Adds `by` to `key`, creating the key with zero first when missing.
    pub fn increment(&mut self, key: &str, by: u64) {
        *self.0.entry(key.to_string()).or_insert(0) += by;
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, u64>> for JobCounters {
    fn from(values: HashMap<String, u64>) -> Self {
        Self(values)
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Missing entry loads as empty counters.
    async fn load(&self) -> Result<JobCounters, CounterStoreError>;

    async fn save(&self, counters: &JobCounters) -> Result<(), CounterStoreError>;

    /// Drops the whole entry.
    async fn clear(&self) -> Result<(), CounterStoreError>;
}

#[derive(thiserror::Error)]
pub enum CounterStoreError {
    #[error("Failed to access the counters store.")]
    RedisError(#[from] redis::RedisError),
}

impl std::fmt::Debug for CounterStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

/// Keeps the counters in a Redis hash.
pub struct RedisCounterStore {
    redis_client: redis::Client,
    key: String,
}

impl RedisCounterStore {
    pub fn new(redis_client: redis::Client) -> Self {
        Self::with_key(redis_client, COUNTERS_ENTRY.to_string())
    }

    pub fn with_key(redis_client: redis::Client, key: String) -> Self {
        Self { redis_client, key }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    #[tracing::instrument(name = "Loading job counters from Redis", skip(self), fields(key = %self.key))]
    async fn load(&self) -> Result<JobCounters, CounterStoreError> {
        let mut redis_conn = self.redis_client.get_tokio_connection().await?;

        let values: HashMap<String, u64> = redis::cmd("HGETALL")
            .arg(&self.key)
            .query_async(&mut redis_conn)
            .await?;

        Ok(JobCounters::from(values))
    }

    #[tracing::instrument(name = "Storing job counters in Redis", skip(self, counters), fields(key = %self.key))]
    async fn save(&self, counters: &JobCounters) -> Result<(), CounterStoreError> {
        if counters.is_empty() {
            return Ok(());
        }

        let mut redis_conn = self.redis_client.get_tokio_connection().await?;
        let mut command = redis::cmd("HSET");

        command.arg(&self.key);
        for (field, value) in counters.iter() {
            command.arg(field).arg(*value);
        }

        command.query_async::<_, ()>(&mut redis_conn).await?;

        Ok(())
    }

    #[tracing::instrument(name = "Deleting job counters from Redis", skip(self), fields(key = %self.key))]
    async fn clear(&self) -> Result<(), CounterStoreError> {
        let mut redis_conn = self.redis_client.get_tokio_connection().await?;

        redis::cmd("DEL")
            .arg(&self.key)
            .query_async::<_, ()>(&mut redis_conn)
            .await?;

        Ok(())
    }
}
