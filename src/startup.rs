use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{DatabaseSettings, ScheduleSettings, Settings, SubscriberApiSettings};
use crate::counters::{CounterStore, RedisCounterStore};
use crate::janitor::Janitor;
use crate::lifecycle;
use crate::scheduler::{TokioScheduler, TriggerRegistrar};
use crate::store::PgSubscriberStore;
use crate::subscriber_api::{SubscriberApi, SubscriberApiClient};
use crate::triggers::RedisTriggerStore;

#[derive(thiserror::Error)]
pub enum StartupError {
    #[error("Failed to build the subscriber API client.")]
    SubscriberApiError(#[from] reqwest::Error),
    #[error("Failed to build the Redis client.")]
    RedisError(#[from] redis::RedisError),
    #[error("Failed to wait for the shutdown signal.")]
    SignalError(#[source] std::io::Error),
}

impl std::fmt::Debug for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

pub struct Application {
    scheduler: Arc<TokioScheduler>,
    registrar: TriggerRegistrar,
    counters: Arc<dyn CounterStore>,
    schedule: ScheduleSettings,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, StartupError> {
        let db_pool = get_connection_db_pool(&config.database);
        let redis_client = redis::Client::open(config.get_redis_address())?;
        let counters: Arc<dyn CounterStore> = Arc::new(RedisCounterStore::with_key(
            redis_client.clone(),
            config.redis.counters_key.clone(),
        ));
        let triggers = Arc::new(RedisTriggerStore::with_prefix(
            redis_client,
            config.redis.triggers_prefix.clone(),
        ));
        let subscriber_api = match &config.subscriber_api {
            Some(settings) => Some(get_subscriber_api(settings)?),
            None => {
                tracing::warn!("No subscriber API configured, janitor jobs will be skipped");
                None
            }
        };

        let janitor = Arc::new(Janitor::new(
            subscriber_api,
            Arc::new(PgSubscriberStore::new(db_pool)),
            Arc::clone(&counters),
            config.get_retention_policy(),
        ));
        let scheduler = Arc::new(TokioScheduler::new(janitor, triggers));
        let registrar = TriggerRegistrar::new(scheduler.clone());

        Ok(Self {
            scheduler,
            registrar,
            counters,
            schedule: config.schedule,
        })
    }

    /// Installs the jobs and keeps them alive until Ctrl-C. Runs in progress are
    /// awaited on the way out; the persisted triggers are resumed on the next start.
    pub async fn run_until_stopped(self) -> Result<(), StartupError> {
        let installed = lifecycle::install(&self.registrar, &self.schedule).await;
        tracing::info!("Janitor started with {} new triggers", installed);

        let mut watchdog =
            time::interval(self.schedule.get_interval().max(time::Duration::from_secs(1)));
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and install just ran.
        watchdog.tick().await;

        loop {
            tokio::select! {
                signal = tokio::signal::ctrl_c() => {
                    signal.map_err(StartupError::SignalError)?;
                    break;
                }
                _ = watchdog.tick() => {
                    let restored = lifecycle::ensure_all(&self.registrar, &self.schedule).await;
                    if restored > 0 {
                        tracing::warn!("Restored {} missing triggers", restored);
                    }
                }
            }
        }

        self.scheduler.shutdown().await;

        Ok(())
    }

    /// Removes every trigger and keeps the counters.
    pub async fn deactivate(self) {
        let cancelled = lifecycle::deactivate(&self.registrar).await;
        tracing::info!("Cancelled {} triggers", cancelled);
        self.scheduler.shutdown().await;
    }

    /// Removes every trigger and the persisted counters.
    pub async fn uninstall(self) {
        lifecycle::uninstall(&self.registrar, self.counters.as_ref()).await;
        self.scheduler.shutdown().await;
    }
}

pub fn get_connection_db_pool(config: &DatabaseSettings) -> Pool<Postgres> {
    PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(2))
        .connect_lazy_with(config.get_db_options())
}

fn get_subscriber_api(
    settings: &SubscriberApiSettings,
) -> Result<Arc<dyn SubscriberApi>, reqwest::Error> {
    let client = SubscriberApiClient::new(
        settings.base_url.clone(),
        settings.api_key.clone(),
        Some(settings.get_timeout()),
    )?;

    Ok(Arc::new(client))
}
