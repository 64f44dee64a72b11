//! Install, start-up, deactivate and uninstall hooks.

use std::time::Duration;

use crate::config::ScheduleSettings;
use crate::counters::CounterStore;
use crate::domain::job::{JobKey, JobName};
use crate::domain::subscriber_status::TRASHABLE_STATUSES;
use crate::scheduler::TriggerRegistrar;

/// Schedules every job with staggered first runs so they don't hit the
/// subscriber service at the same time. Returns how many triggers were added.
#[tracing::instrument(name = "Installing janitor jobs", skip(registrar, schedule))]
pub async fn install(registrar: &TriggerRegistrar, schedule: &ScheduleSettings) -> usize {
    let mut installed = 0;

    for (position, job) in JobKey::all().into_iter().enumerate() {
        if registrar
            .ensure_scheduled(
                job,
                schedule.get_interval(),
                schedule.get_first_run_offset(position),
            )
            .await
        {
            installed += 1;
        }
    }

    installed
}

/// Re-asserts every trigger on start-up; missing ones fire right away.
#[tracing::instrument(name = "Ensuring janitor jobs", skip(registrar, schedule))]
pub async fn ensure_all(registrar: &TriggerRegistrar, schedule: &ScheduleSettings) -> usize {
    let mut installed = 0;

    for job in JobKey::all() {
        if registrar
            .ensure_scheduled(job, schedule.get_interval(), Duration::ZERO)
            .await
        {
            installed += 1;
        }
    }

    installed
}

/// Cancels every trigger and keeps the counters.
#[tracing::instrument(name = "Deactivating janitor jobs", skip(registrar))]
pub async fn deactivate(registrar: &TriggerRegistrar) -> usize {
    let status_payloads: Vec<_> = TRASHABLE_STATUSES.into_iter().map(Some).collect();

    registrar.cancel_all(JobName::PurgeTrash, &[None]).await
        + registrar
            .cancel_all(JobName::MoveToTrash, &status_payloads)
            .await
}

/// Cancels every trigger and deletes the counters entry.
#[tracing::instrument(name = "Uninstalling janitor", skip(registrar, counters))]
pub async fn uninstall(registrar: &TriggerRegistrar, counters: &dyn CounterStore) {
    let cancelled = deactivate(registrar).await;

    if let Err(err) = counters.clear().await {
        tracing::error!("Failed to delete job counters: {:?}", err);
    }

    tracing::info!("Cancelled {} triggers", cancelled);
}
