//! Recurring triggers for the janitor jobs.
//!
//! Every [`JobKey`] owns at most one persisted trigger and, while the process
//! runs, one timer task. Ticks of the same key run one after another inside that
//! task, so a job never overlaps itself; ticks missed while a run is still in
//! progress are skipped rather than queued. Stopping a timer never interrupts
//! the run in progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::domain::job::{JobKey, JobName};
use crate::domain::subscriber_status::SubscriberStatus;
use crate::triggers::{ScheduledTrigger, TriggerStore, TriggerStoreError};

/// Work executed when a trigger fires.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &JobKey);
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Persisted trigger of `job`, `None` when it is not registered.
    async fn trigger(&self, job: &JobKey) -> Result<Option<ScheduledTrigger>, SchedulerError>;

    /// Whether the timer of `job` is running in this process.
    async fn is_running(&self, job: &JobKey) -> bool;

    /// Persists `trigger` and starts its timer. A timer already running for
    /// `job` is kept as is.
    async fn schedule(&self, job: JobKey, trigger: ScheduledTrigger) -> Result<(), SchedulerError>;

    /// Stops the timer of `job` and forgets its trigger. Returns whether
    /// anything was removed.
    async fn clear(&self, job: &JobKey) -> Result<bool, SchedulerError>;
}

#[derive(thiserror::Error)]
pub enum SchedulerError {
    #[error("The scheduler is not running.")]
    Unavailable,
    #[error("A trigger interval must be greater than zero.")]
    InvalidInterval,
    #[error("First run offset {0:?} is out of range.")]
    InvalidOffset(Duration),
    #[error("Failed to access the persisted triggers.")]
    TriggerStoreError(#[from] TriggerStoreError),
}

impl std::fmt::Debug for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

struct Timer {
    handle: JoinHandle<()>,
    // Dropping the sender ends the timer loop once the current run is over.
    stop: watch::Sender<()>,
}

impl Timer {
    fn stop(self) -> JoinHandle<()> {
        drop(self.stop);
        self.handle
    }
}

#[derive(Default)]
struct SchedulerState {
    timers: HashMap<JobKey, Timer>,
    closed: bool,
}

/// Tokio timers driven by triggers kept in a [`TriggerStore`].
pub struct TokioScheduler {
    runner: Arc<dyn JobRunner>,
    triggers: Arc<dyn TriggerStore>,
    state: Arc<Mutex<SchedulerState>>,
}

impl TokioScheduler {
    pub fn new(runner: Arc<dyn JobRunner>, triggers: Arc<dyn TriggerStore>) -> Self {
        Self {
            runner,
            triggers,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Stops every timer and waits for the runs in progress. Persisted triggers
    /// are kept for the next start. Later registrations fail with
    /// [`SchedulerError::Unavailable`].
    pub async fn shutdown(&self) {
        let timers: Vec<_> = {
            let mut state = self.state.lock().await;

            state.closed = true;
            state.timers.drain().collect()
        };

        for (job, timer) in timers {
            if let Err(err) = timer.stop().await {
                tracing::error!("Timer of {} ended abnormally: {:?}", job, err);
            }
        }

        tracing::info!("Scheduler shut down");
    }

    fn spawn_timer(
        &self,
        runtime: &tokio::runtime::Handle,
        job: JobKey,
        trigger: ScheduledTrigger,
    ) -> Timer {
        let (stop, mut stopped) = watch::channel(());
        let runner = Arc::clone(&self.runner);
        let triggers = Arc::clone(&self.triggers);
        let state: Weak<Mutex<SchedulerState>> = Arc::downgrade(&self.state);
        // Overdue triggers fire right away.
        let delay = (trigger.next_run - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + delay, trigger.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut trigger = trigger;

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }

                let Some(shared) = state.upgrade() else { break };
                let guard = shared.lock().await;

                // Checked under the lock so a concurrent clear is not undone by the save.
                if stopped.has_changed().is_err() {
                    break;
                }

                trigger = trigger.advance(Utc::now());
                if let Err(err) = triggers.save(&job, &trigger).await {
                    tracing::warn!("Failed to persist the next run of {}: {:?}", job, err);
                }

                drop(guard);
                drop(shared);

                tracing::info!("Running job {}", job);
                runner.run(&job).await;
            }

            tracing::debug!("Timer of {} stopped", job);
        });

        Timer { handle, stop }
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn trigger(&self, job: &JobKey) -> Result<Option<ScheduledTrigger>, SchedulerError> {
        Ok(self.triggers.load(job).await?)
    }

    async fn is_running(&self, job: &JobKey) -> bool {
        let state = self.state.lock().await;

        state
            .timers
            .get(job)
            .map_or(false, |timer| !timer.handle.is_finished())
    }

    async fn schedule(&self, job: JobKey, trigger: ScheduledTrigger) -> Result<(), SchedulerError> {
        if trigger.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::Unavailable)?;
        let mut state = self.state.lock().await;

        if state.closed {
            return Err(SchedulerError::Unavailable);
        }

        self.triggers.save(&job, &trigger).await?;

        // A finished task means a run panicked; its timer is replaced.
        if let Some(timer) = state.timers.get(&job) {
            if !timer.handle.is_finished() {
                return Ok(());
            }
        }

        let timer = self.spawn_timer(&runtime, job, trigger);
        state.timers.insert(job, timer);

        Ok(())
    }

    async fn clear(&self, job: &JobKey) -> Result<bool, SchedulerError> {
        let mut state = self.state.lock().await;

        if state.closed {
            return Err(SchedulerError::Unavailable);
        }

        // The run in progress, if any, completes in the background.
        let stopped = state.timers.remove(job).map(Timer::stop).is_some();
        let removed = self.triggers.remove(job).await?;

        Ok(stopped || removed)
    }
}

/// Idempotent registration on top of a [`Scheduler`]. Scheduler failures are
/// logged and turned into no-ops.
#[derive(Clone)]
pub struct TriggerRegistrar {
    scheduler: Arc<dyn Scheduler>,
}

impl TriggerRegistrar {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Registers a trigger firing at `now + first_run_offset` and then every
    /// `interval`, unless one is already persisted for `job`. A persisted trigger
    /// whose timer is not running in this process is resumed at its stored next
    /// run. Returns whether a new trigger was registered.
    #[tracing::instrument(name = "Ensuring a job is scheduled", skip(self, job), fields(job = %job))]
    pub async fn ensure_scheduled(
        &self,
        job: JobKey,
        interval: Duration,
        first_run_offset: Duration,
    ) -> bool {
        let stored = match self.scheduler.trigger(&job).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("Failed to read the trigger of {}: {:?}", job, err);
                return false;
            }
        };

        if let Some(trigger) = stored {
            if !self.scheduler.is_running(&job).await {
                match self.scheduler.schedule(job, trigger).await {
                    Ok(()) => tracing::info!("Resumed {}, next run at {}", job, trigger.next_run),
                    Err(err) => tracing::warn!("Failed to resume {}: {:?}", job, err),
                }
            }

            return false;
        }

        let result = match chrono::Duration::from_std(first_run_offset) {
            Ok(offset) => {
                let trigger = ScheduledTrigger {
                    next_run: Utc::now() + offset,
                    interval,
                };

                self.scheduler.schedule(job, trigger).await
            }
            Err(_) => Err(SchedulerError::InvalidOffset(first_run_offset)),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    "Scheduled {} every {:?}, first run in {:?}",
                    job,
                    interval,
                    first_run_offset
                );
                true
            }
            Err(err) => {
                tracing::warn!("Failed to schedule {}: {:?}", job, err);
                false
            }
        }
    }

    /// Removes the triggers of `name` for each payload. Returns how many were removed.
    #[tracing::instrument(name = "Cancelling job triggers", skip(self, name), fields(job = %name.as_ref()))]
    pub async fn cancel_all(&self, name: JobName, payloads: &[Option<SubscriberStatus>]) -> usize {
        let mut cancelled = 0;

        for payload in payloads {
            let job = JobKey {
                name,
                payload: *payload,
            };

            match self.scheduler.clear(&job).await {
                Ok(true) => cancelled += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!("Failed to cancel {}: {:?}", job, err),
            }
        }

        cancelled
    }

    /// Next persisted run of `job`, `None` when it is not scheduled.
    pub async fn next_run(&self, job: &JobKey) -> Option<DateTime<Utc>> {
        match self.scheduler.trigger(job).await {
            Ok(trigger) => trigger.map(|trigger| trigger.next_run),
            Err(err) => {
                tracing::warn!("Failed to read the trigger of {}: {:?}", job, err);
                None
            }
        }
    }

    pub async fn is_scheduled(&self, job: &JobKey) -> bool {
        self.next_run(job).await.is_some()
    }
}
