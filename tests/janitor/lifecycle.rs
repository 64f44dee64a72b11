use chrono::Duration;
use std::sync::Arc;
use std::time;
use subscriber_janitor::{
    config::ScheduleSettings,
    counters::{CounterStore, JobCounters},
    domain::{job::JobKey, subscriber_status::SubscriberStatus},
    lifecycle,
    scheduler::{TokioScheduler, TriggerRegistrar},
};

use crate::helpers::TestJanitor;

fn hourly_schedule() -> ScheduleSettings {
    ScheduleSettings {
        interval_seconds: 3600,
        first_run_offset_seconds: 600,
        stagger_seconds: 600,
    }
}

fn registrar_for(app: &TestJanitor) -> (Arc<TokioScheduler>, TriggerRegistrar) {
    app.start_scheduler()
}

#[tokio::test(start_paused = true)]
async fn install_schedules_every_job_once() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);

    assert_eq!(lifecycle::install(&registrar, &hourly_schedule()).await, 5);
    assert_eq!(lifecycle::install(&registrar, &hourly_schedule()).await, 0);
    assert_eq!(lifecycle::ensure_all(&registrar, &hourly_schedule()).await, 0);

    for job in JobKey::all() {
        assert!(registrar.is_scheduled(&job).await, "{} is not scheduled", job);
    }
}

#[tokio::test(start_paused = true)]
async fn ensure_all_restores_cancelled_triggers() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);

    lifecycle::install(&registrar, &hourly_schedule()).await;
    registrar
        .cancel_all(
            subscriber_janitor::domain::job::JobName::MoveToTrash,
            &[Some(SubscriberStatus::Bounced)],
        )
        .await;

    assert_eq!(lifecycle::ensure_all(&registrar, &hourly_schedule()).await, 1);
    assert!(
        registrar
            .is_scheduled(&JobKey::move_to_trash(SubscriberStatus::Bounced))
            .await
    );
}

#[tokio::test(start_paused = true)]
async fn installed_jobs_run_on_their_staggered_schedule() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(2));
    let inactive = app.add_subscriber(SubscriberStatus::Inactive, Duration::days(9));

    lifecycle::install(&registrar, &hourly_schedule()).await;

    // inactive fires at 20 minutes, bounced at 50 minutes
    tokio::time::sleep(time::Duration::from_secs(25 * 60)).await;
    assert!(app.backend.is_trashed(inactive));
    assert!(!app.backend.is_trashed(bounced));

    tokio::time::sleep(time::Duration::from_secs(30 * 60)).await;
    assert!(app.backend.is_trashed(bounced));
    assert_eq!(app.counters.get("inactive"), Some(1));
    assert_eq!(app.counters.get("bounced"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn deactivate_cancels_every_trigger_and_keeps_counters() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);
    let mut counters = JobCounters::default();
    counters.increment("bounced", 4);
    app.counters.save(&counters).await.unwrap();

    lifecycle::install(&registrar, &hourly_schedule()).await;

    assert_eq!(lifecycle::deactivate(&registrar).await, 5);
    for job in JobKey::all() {
        assert!(!registrar.is_scheduled(&job).await);
    }
    assert_eq!(app.counters.get("bounced"), Some(4));
}

#[tokio::test(start_paused = true)]
async fn deactivated_jobs_no_longer_run() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(2));

    lifecycle::install(&registrar, &hourly_schedule()).await;
    lifecycle::deactivate(&registrar).await;

    tokio::time::sleep(time::Duration::from_secs(3 * 60 * 60)).await;

    assert!(!app.backend.is_trashed(bounced));
}

#[tokio::test(start_paused = true)]
async fn uninstall_cancels_every_trigger_and_deletes_counters() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);
    let mut counters = JobCounters::default();
    counters.increment("deleted", 7);
    app.counters.save(&counters).await.unwrap();

    lifecycle::install(&registrar, &hourly_schedule()).await;
    lifecycle::uninstall(&registrar, app.counters.as_ref()).await;

    for job in JobKey::all() {
        assert!(!registrar.is_scheduled(&job).await);
    }
    assert!(!app.counters.is_stored());
}

#[tokio::test(start_paused = true)]
async fn restart_resumes_the_persisted_schedule() {
    let app = TestJanitor::spawn();
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(2));

    let (scheduler, registrar) = registrar_for(&app);
    assert_eq!(lifecycle::install(&registrar, &hourly_schedule()).await, 5);
    let next_bounced_run = registrar
        .next_run(&JobKey::move_to_trash(SubscriberStatus::Bounced))
        .await;
    scheduler.shutdown().await;

    let (_scheduler, registrar) = registrar_for(&app);
    assert_eq!(lifecycle::install(&registrar, &hourly_schedule()).await, 0);
    assert_eq!(lifecycle::ensure_all(&registrar, &hourly_schedule()).await, 0);
    assert_eq!(
        registrar
            .next_run(&JobKey::move_to_trash(SubscriberStatus::Bounced))
            .await,
        next_bounced_run
    );

    tokio::time::sleep(time::Duration::from_secs(55 * 60)).await;

    assert!(app.backend.is_trashed(bounced));
    assert_eq!(app.counters.get("bounced"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn shutdown_lets_the_running_job_record_its_counter() {
    let app = TestJanitor::spawn();
    let (scheduler, registrar) = registrar_for(&app);
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(2));
    app.backend.slow_down_api(time::Duration::from_secs(60));

    registrar
        .ensure_scheduled(
            JobKey::move_to_trash(SubscriberStatus::Bounced),
            time::Duration::from_secs(3600),
            time::Duration::ZERO,
        )
        .await;
    tokio::time::sleep(time::Duration::from_secs(10)).await;
    assert!(!app.backend.is_trashed(bounced));

    scheduler.shutdown().await;

    assert!(app.backend.is_trashed(bounced));
    assert_eq!(app.counters.get("bounced"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn deactivate_lets_the_running_job_record_its_counter() {
    let app = TestJanitor::spawn();
    let (_scheduler, registrar) = registrar_for(&app);
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(2));
    app.backend.slow_down_api(time::Duration::from_secs(60));

    registrar
        .ensure_scheduled(
            JobKey::move_to_trash(SubscriberStatus::Bounced),
            time::Duration::from_secs(3600),
            time::Duration::ZERO,
        )
        .await;
    tokio::time::sleep(time::Duration::from_secs(10)).await;

    assert_eq!(lifecycle::deactivate(&registrar).await, 1);
    tokio::time::sleep(time::Duration::from_secs(3 * 60 * 60)).await;

    assert!(app.backend.is_trashed(bounced));
    assert_eq!(app.counters.get("bounced"), Some(1));
}
