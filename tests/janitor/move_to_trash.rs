use chrono::Duration;
use subscriber_janitor::domain::subscriber_status::{SubscriberStatus, TRASHABLE_STATUSES};

use crate::helpers::{Account, TestJanitor};

#[tokio::test]
async fn unsubscribed_subscribers_are_trashed_after_one_hour() {
    let app = TestJanitor::spawn();
    let stale = app.add_subscriber(SubscriberStatus::Unsubscribed, Duration::hours(2));
    let recent = app.add_subscriber(SubscriberStatus::Unsubscribed, Duration::minutes(30));

    let moved = app.move_to_trash(SubscriberStatus::Unsubscribed).await;

    assert_eq!(moved, 1);
    assert_eq!(app.backend.deleted_at(stale), Some(app.now));
    assert!(!app.backend.is_trashed(recent));
}

#[tokio::test]
async fn bounced_subscribers_are_trashed_after_one_hour() {
    let app = TestJanitor::spawn();
    let stale = app.add_subscriber(SubscriberStatus::Bounced, Duration::minutes(61));
    let recent = app.add_subscriber(SubscriberStatus::Bounced, Duration::minutes(59));

    app.move_to_trash(SubscriberStatus::Bounced).await;

    assert!(app.backend.is_trashed(stale));
    assert!(!app.backend.is_trashed(recent));
}

#[tokio::test]
async fn inactive_and_unconfirmed_subscribers_get_a_week_of_grace() {
    let app = TestJanitor::spawn();
    let test_cases = vec![
        (SubscriberStatus::Inactive, Duration::days(8), true),
        (SubscriberStatus::Inactive, Duration::days(3), false),
        (SubscriberStatus::Unconfirmed, Duration::days(8), true),
        (SubscriberStatus::Unconfirmed, Duration::days(3), false),
    ];

    for (status, updated_ago, expect_trashed) in test_cases {
        let id = app.add_subscriber(status, updated_ago);

        app.move_to_trash(status).await;

        assert_eq!(
            app.backend.is_trashed(id),
            expect_trashed,
            "{} subscriber updated {} days ago",
            status,
            updated_ago.num_days()
        );
    }
}

#[tokio::test]
async fn linked_accounts_are_never_trashed() {
    let app = TestJanitor::spawn();
    let mut linked = Vec::new();

    for status in TRASHABLE_STATUSES {
        linked.push(app.add_linked_subscriber(status, Duration::days(365), Account::SiteUser));
        linked.push(app.add_linked_subscriber(status, Duration::days(365), Account::Ecommerce));
    }

    for status in TRASHABLE_STATUSES {
        assert_eq!(app.move_to_trash(status).await, 0);
    }

    for id in linked {
        assert!(!app.backend.is_trashed(id));
    }
}

#[tokio::test]
async fn only_subscribers_with_the_given_status_are_trashed() {
    let app = TestJanitor::spawn();
    let bounced = app.add_subscriber(SubscriberStatus::Bounced, Duration::days(30));
    let inactive = app.add_subscriber(SubscriberStatus::Inactive, Duration::days(30));
    let subscribed = app.add_subscriber(SubscriberStatus::Subscribed, Duration::days(30));

    app.move_to_trash(SubscriberStatus::Bounced).await;

    assert!(app.backend.is_trashed(bounced));
    assert!(!app.backend.is_trashed(inactive));
    assert!(!app.backend.is_trashed(subscribed));
}

#[tokio::test]
async fn subscribed_subscribers_are_never_trashed() {
    let app = TestJanitor::spawn();
    let subscribed = app.add_subscriber(SubscriberStatus::Subscribed, Duration::days(365));

    assert_eq!(app.move_to_trash(SubscriberStatus::Subscribed).await, 0);
    assert!(!app.backend.is_trashed(subscribed));
    assert!(!app.counters.is_stored());
}

#[tokio::test]
async fn running_twice_trashes_the_same_subscribers() {
    let app = TestJanitor::spawn();
    let stale = app.add_subscriber(SubscriberStatus::Inactive, Duration::days(10));
    let recent = app.add_subscriber(SubscriberStatus::Inactive, Duration::days(1));

    let first_run = app.move_to_trash(SubscriberStatus::Inactive).await;
    let deleted_at = app.backend.deleted_at(stale);
    let second_run = app.move_to_trash(SubscriberStatus::Inactive).await;

    assert_eq!(first_run, 1);
    assert_eq!(second_run, 0);
    assert_eq!(app.backend.deleted_at(stale), deleted_at);
    assert!(!app.backend.is_trashed(recent));
    assert_eq!(app.counters.get("inactive"), Some(1));
}

#[tokio::test]
async fn counters_are_incremented_by_the_number_of_trashed_subscribers() {
    let app = TestJanitor::spawn();

    for _ in 0..3 {
        app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(5));
    }
    app.move_to_trash(SubscriberStatus::Bounced).await;

    assert_eq!(app.counters.get("bounced"), Some(3));

    for _ in 0..2 {
        app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(5));
    }
    app.move_to_trash(SubscriberStatus::Bounced).await;

    assert_eq!(app.counters.get("bounced"), Some(5));
    assert_eq!(app.counters.get("deleted"), None);
}

#[tokio::test]
async fn counter_is_created_even_when_nothing_qualifies() {
    let app = TestJanitor::spawn();
    app.add_subscriber(SubscriberStatus::Unconfirmed, Duration::hours(1));

    app.move_to_trash(SubscriberStatus::Unconfirmed).await;

    assert_eq!(app.counters.get("unconfirmed"), Some(0));
}

#[tokio::test]
async fn empty_status_leaves_counters_untouched() {
    let app = TestJanitor::spawn();

    assert_eq!(app.move_to_trash(SubscriberStatus::Bounced).await, 0);
    assert!(!app.counters.is_stored());
}

#[tokio::test]
async fn missing_subscriber_api_skips_the_run() {
    let app = TestJanitor::spawn_without_api();
    let stale = app.add_subscriber(SubscriberStatus::Bounced, Duration::days(3));

    assert_eq!(app.move_to_trash(SubscriberStatus::Bounced).await, 0);
    assert!(!app.backend.is_trashed(stale));
    assert!(!app.counters.is_stored());
}

#[tokio::test]
async fn status_change_after_trashing_is_not_counted_twice() {
    let app = TestJanitor::spawn();
    let id = app.add_subscriber(SubscriberStatus::Bounced, Duration::hours(3));

    app.move_to_trash(SubscriberStatus::Bounced).await;
    let deleted_at = app.backend.deleted_at(id);

    app.backend
        .set_status(id, SubscriberStatus::Unsubscribed, app.now - Duration::hours(2));
    let moved = app.move_to_trash(SubscriberStatus::Unsubscribed).await;

    assert_eq!(moved, 0);
    assert_eq!(app.backend.deleted_at(id), deleted_at);
    assert_eq!(app.counters.get("bounced"), Some(1));
    assert_eq!(app.counters.get("unsubscribed"), Some(0));
}
